// src/pipeline/metrics.rs
//
// Timing and counters for one analysis run. Logged at the end of the
// session and exposed on the status endpoint.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub total_frames: Arc<AtomicU64>,
    pub frames_with_vehicles: Arc<AtomicU64>,
    pub total_detections: Arc<AtomicU64>,
    pub detection_time_us: Arc<AtomicU64>,
    pub annotate_time_us: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            total_frames: Arc::new(AtomicU64::new(0)),
            frames_with_vehicles: Arc::new(AtomicU64::new(0)),
            total_detections: Arc::new(AtomicU64::new(0)),
            detection_time_us: Arc::new(AtomicU64::new(0)),
            annotate_time_us: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn set_timing(&self, counter: &AtomicU64, duration_us: u64) {
        counter.store(duration_us, Ordering::Relaxed);
    }

    pub fn fps(&self) -> f64 {
        let frames = self.total_frames.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            frames as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_frames: self.total_frames.load(Ordering::Relaxed),
            frames_with_vehicles: self.frames_with_vehicles.load(Ordering::Relaxed),
            total_detections: self.total_detections.load(Ordering::Relaxed),
            fps: self.fps(),
            last_detection_us: self.detection_time_us.load(Ordering::Relaxed),
            last_annotate_us: self.annotate_time_us.load(Ordering::Relaxed),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub total_frames: u64,
    pub frames_with_vehicles: u64,
    pub total_detections: u64,
    pub fps: f64,
    pub last_detection_us: u64,
    pub last_annotate_us: u64,
    pub elapsed_secs: f64,
}
