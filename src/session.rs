// src/session.rs
//
// The single analysis session the dashboard shows. Only one runs at a time;
// a finished session stays visible until the next upload replaces it.

use crate::decision::DecisionSummary;
use crate::pipeline::{AnalysisReport, FrameUpdate, MetricCards, MetricsSummary};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub file_name: String,
    pub phase: SessionPhase,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub frames_processed: u64,
    pub total_frames: u64,
    pub progress: f32,
    pub caption: String,
    pub running_totals: BTreeMap<String, u64>,
    pub preview_jpeg: Option<Vec<u8>>,
    pub report: Option<AnalysisReport>,
    pub error: Option<String>,
}

impl Session {
    pub fn start(file_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_name: file_name.into(),
            phase: SessionPhase::Running,
            started_at: Utc::now(),
            finished_at: None,
            frames_processed: 0,
            total_frames: 0,
            progress: 0.0,
            caption: "🔍 Analyzing video... please wait".to_string(),
            running_totals: BTreeMap::new(),
            preview_jpeg: None,
            report: None,
            error: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase == SessionPhase::Running
    }

    pub fn apply_update(&mut self, update: FrameUpdate) {
        self.frames_processed = update.frame_index + 1;
        self.total_frames = update.total_frames;
        self.progress = update.progress;
        self.caption = update.caption;
        self.running_totals = update.running_totals;
        // Keep the last good preview when a frame failed to render
        if update.preview_jpeg.is_some() {
            self.preview_jpeg = update.preview_jpeg;
        }
    }

    pub fn complete(&mut self, report: AnalysisReport) {
        self.phase = SessionPhase::Completed;
        self.finished_at = Some(Utc::now());
        self.frames_processed = report.frames_processed;
        self.progress = 1.0;
        self.running_totals = report.totals();
        self.report = Some(report);
    }

    pub fn fail(&mut self, error: String) {
        self.phase = SessionPhase::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    /// CSV is only offered once the table is final.
    pub fn csv(&self) -> Option<String> {
        match (&self.phase, &self.report) {
            (SessionPhase::Completed, Some(report)) => Some(report.to_csv()),
            _ => None,
        }
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            session_id: Some(self.id),
            state: self.phase,
            file_name: Some(self.file_name.clone()),
            started_at: Some(self.started_at),
            finished_at: self.finished_at,
            frames_processed: self.frames_processed,
            total_frames: self.total_frames,
            progress: self.progress,
            caption: self.caption.clone(),
            metrics: MetricCards::from_totals(&self.running_totals),
            totals: self.running_totals.clone(),
            has_preview: self.preview_jpeg.is_some(),
            decision: self.report.as_ref().map(|r| r.decision.clone()),
            processing: self.report.as_ref().map(|r| r.metrics.clone()),
            error: self.error.clone(),
        }
    }
}

/// JSON snapshot polled by the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub session_id: Option<Uuid>,
    pub state: SessionPhase,
    pub file_name: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub frames_processed: u64,
    pub total_frames: u64,
    pub progress: f32,
    pub caption: String,
    pub metrics: MetricCards,
    pub totals: BTreeMap<String, u64>,
    pub has_preview: bool,
    pub decision: Option<DecisionSummary>,
    pub processing: Option<MetricsSummary>,
    pub error: Option<String>,
}

impl SessionStatus {
    pub fn idle() -> Self {
        Self {
            session_id: None,
            state: SessionPhase::Idle,
            file_name: None,
            started_at: None,
            finished_at: None,
            frames_processed: 0,
            total_frames: 0,
            progress: 0.0,
            caption: "📤 Upload a traffic video to analyze".to_string(),
            metrics: MetricCards::default(),
            totals: BTreeMap::new(),
            has_preview: false,
            decision: None,
            processing: None,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counts::CountTable;
    use crate::pipeline::PipelineMetrics;
    use crate::types::DecisionConfig;

    fn update(index: u64, car: u64, preview: bool) -> FrameUpdate {
        FrameUpdate {
            frame_index: index,
            total_frames: 4,
            progress: (index + 1) as f32 / 4.0,
            caption: format!("📹 Frame {}/4", index + 1),
            running_totals: [("car".to_string(), car)].into_iter().collect(),
            preview_jpeg: preview.then(|| vec![0xFF, 0xD8]),
        }
    }

    fn report() -> AnalysisReport {
        let mut table = CountTable::new();
        table.push([("car", 2u32)].into_iter().collect());
        table.push([("bus", 1u32)].into_iter().collect());
        let decision = DecisionSummary::from_table(&table, &DecisionConfig::default());
        AnalysisReport {
            frames_processed: 2,
            total_frames: 2,
            table,
            decision,
            metrics: PipelineMetrics::new().summary(),
        }
    }

    #[test]
    fn test_updates_track_latest_frame() {
        let mut session = Session::start("clip.mp4");
        session.apply_update(update(0, 1, true));
        session.apply_update(update(1, 3, false));

        let status = session.status();
        assert_eq!(status.state, SessionPhase::Running);
        assert_eq!(status.frames_processed, 2);
        assert_eq!(status.metrics.cars, 3);
        assert_eq!(status.caption, "📹 Frame 2/4");
        assert!(status.has_preview);
        assert!(session.csv().is_none());
    }

    #[test]
    fn test_complete_exposes_csv_and_decision() {
        let mut session = Session::start("clip.mp4");
        session.complete(report());

        assert!(!session.is_running());
        assert_eq!(session.csv().unwrap(), "car,bus\n2,0\n0,1\n");

        let status = session.status();
        assert_eq!(status.state, SessionPhase::Completed);
        assert_eq!(status.metrics.buses, 1);
        assert_eq!(status.decision.unwrap().action, "Normal Cycle");
        assert!(status.finished_at.is_some());
    }

    #[test]
    fn test_failed_session_has_no_csv() {
        let mut session = Session::start("clip.avi");
        session.fail("Failed to open video file".to_string());

        assert_eq!(session.phase, SessionPhase::Failed);
        assert!(session.csv().is_none());
        assert_eq!(
            session.status().error.as_deref(),
            Some("Failed to open video file")
        );
    }

    #[test]
    fn test_status_serializes_state_name() {
        let json = serde_json::to_value(SessionStatus::idle()).unwrap();
        assert_eq!(json["state"], "idle");
        assert_eq!(json["metrics"]["cars"], 0);
    }
}
