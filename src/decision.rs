// src/decision.rs

use crate::counts::CountTable;
use crate::types::DecisionConfig;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalDecision {
    ExtendGreen,
    BusPriority,
    NormalCycle,
}

impl SignalDecision {
    /// Static rule over session-long totals: congestion first, then bus load.
    pub fn decide(table: &CountTable, config: &DecisionConfig) -> Self {
        let total = table.grand_total();

        if total > config.congestion_threshold {
            return Self::ExtendGreen;
        }

        if table.has_column(&config.bus_class)
            && table.column_sum(&config.bus_class) > config.bus_priority_threshold
        {
            return Self::BusPriority;
        }

        Self::NormalCycle
    }

    pub fn action(&self) -> &'static str {
        match self {
            Self::ExtendGreen => "Extend Green by 10s",
            Self::BusPriority => "Priority Green for Bus Lane",
            Self::NormalCycle => "Normal Cycle",
        }
    }

    pub fn light_image_url(&self) -> &'static str {
        match self {
            Self::ExtendGreen => {
                "https://upload.wikimedia.org/wikipedia/commons/1/1b/Traffic_light_green.png"
            }
            Self::BusPriority => {
                "https://upload.wikimedia.org/wikipedia/commons/8/89/Traffic_light_green.png"
            }
            Self::NormalCycle => {
                "https://upload.wikimedia.org/wikipedia/commons/5/5f/Traffic_light_yellow.png"
            }
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Self::ExtendGreen => "🟢",
            Self::BusPriority => "🚌",
            Self::NormalCycle => "🟡",
        }
    }
}

/// Decision plus the numbers it was taken from, as shown on the banner.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionSummary {
    pub decision: SignalDecision,
    pub action: &'static str,
    pub light_image_url: &'static str,
    pub total_detections: u64,
    pub bus_detections: u64,
}

impl DecisionSummary {
    pub fn from_table(table: &CountTable, config: &DecisionConfig) -> Self {
        let decision = SignalDecision::decide(table, config);
        let total_detections = table.grand_total();
        let bus_detections = table.column_sum(&config.bus_class);

        info!(
            "🚥 Signal decision: {} {} (total={}, {}={})",
            decision.icon(),
            decision.action(),
            total_detections,
            config.bus_class,
            bus_detections
        );

        Self {
            decision,
            action: decision.action(),
            light_image_url: decision.light_image_url(),
            total_detections,
            bus_detections,
        }
    }
}
