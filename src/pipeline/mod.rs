// src/pipeline/mod.rs
//
// Sequential per-frame loop: read -> detect -> count -> annotate -> report.

pub mod frame_context;
pub mod metrics;

pub use frame_context::FrameContext;
pub use metrics::{MetricsSummary, PipelineMetrics};

use crate::counts::CountTable;
use crate::decision::DecisionSummary;
use crate::types::{Config, Detection, Frame};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info, warn};

pub const CAR_CLASS: &str = "car";
pub const BUS_CLASS: &str = "bus";
pub const BIKE_CLASS: &str = "motorcycle";

/// Anything that yields decoded frames in order.
pub trait FrameSource {
    /// Frame count reported by the container, 0 when unknown.
    fn total_frames(&self) -> u64;

    /// `Ok(None)` at end of stream.
    fn read_frame(&mut self) -> Result<Option<Frame>>;
}

pub trait VehicleDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}

/// Renders a frame with its detections into a JPEG preview.
pub trait FrameAnnotator {
    fn annotate(&self, ctx: &FrameContext) -> Result<Vec<u8>>;
}

/// Pushed to the caller after every processed frame.
#[derive(Debug, Clone)]
pub struct FrameUpdate {
    pub frame_index: u64,
    pub total_frames: u64,
    pub progress: f32,
    pub caption: String,
    pub running_totals: BTreeMap<String, u64>,
    pub preview_jpeg: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricCards {
    pub cars: u64,
    pub buses: u64,
    pub bikes: u64,
}

impl MetricCards {
    pub fn from_totals(totals: &BTreeMap<String, u64>) -> Self {
        let get = |class: &str| totals.get(class).copied().unwrap_or(0);
        Self {
            cars: get(CAR_CLASS),
            buses: get(BUS_CLASS),
            bikes: get(BIKE_CLASS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub frames_processed: u64,
    pub total_frames: u64,
    pub table: CountTable,
    pub decision: DecisionSummary,
    pub metrics: MetricsSummary,
}

impl AnalysisReport {
    pub fn totals(&self) -> BTreeMap<String, u64> {
        self.table.totals().into_iter().collect()
    }

    pub fn cards(&self) -> MetricCards {
        MetricCards::from_totals(&self.totals())
    }

    pub fn to_csv(&self) -> String {
        self.table.to_csv()
    }
}

pub fn run_analysis<S, D, A>(
    source: &mut S,
    detector: &mut D,
    annotator: &A,
    config: &Config,
    mut on_frame: impl FnMut(FrameUpdate),
) -> Result<AnalysisReport>
where
    S: FrameSource + ?Sized,
    D: VehicleDetector + ?Sized,
    A: FrameAnnotator + ?Sized,
{
    let total_frames = source.total_frames();
    let class_filter = &config.detection.class_filter;
    let metrics = PipelineMetrics::new();

    let mut table = CountTable::new();
    let mut running_totals: BTreeMap<String, u64> = BTreeMap::new();
    let mut frame_index: u64 = 0;

    info!("🔍 Analyzing video ({} frames reported)", total_frames);

    loop {
        if total_frames > 0 && frame_index >= total_frames {
            break;
        }

        let frame = match source.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!("End of stream after {} frames", frame_index);
                break;
            }
            Err(e) => {
                warn!("Frame read failed at frame {}: {:#}", frame_index + 1, e);
                break;
            }
        };

        let t0 = Instant::now();
        let mut detections = detector
            .detect(&frame)
            .with_context(|| format!("Detection failed on frame {}", frame_index + 1))?;
        metrics.set_timing(&metrics.detection_time_us, t0.elapsed().as_micros() as u64);

        if !class_filter.is_empty() {
            detections.retain(|d| class_filter.iter().any(|c| c == &d.class_name));
        }

        metrics.inc(&metrics.total_frames);
        metrics.add(&metrics.total_detections, detections.len() as u64);
        if !detections.is_empty() {
            metrics.inc(&metrics.frames_with_vehicles);
        }

        let ctx = FrameContext::new(frame_index, total_frames, frame, detections);

        let t1 = Instant::now();
        let preview_jpeg = match annotator.annotate(&ctx) {
            Ok(jpeg) => Some(jpeg),
            Err(e) => {
                warn!("Preview rendering failed on frame {}: {:#}", frame_index + 1, e);
                None
            }
        };
        metrics.set_timing(&metrics.annotate_time_us, t1.elapsed().as_micros() as u64);

        debug!(
            "Frame {}: {} detections",
            frame_index + 1,
            ctx.detections.len()
        );

        let progress = ctx.progress();
        let caption = ctx.caption();

        for class in ctx.counts.classes() {
            *running_totals.entry(class.to_string()).or_insert(0) += ctx.counts.get(class) as u64;
        }
        table.push(ctx.counts);

        on_frame(FrameUpdate {
            frame_index,
            total_frames,
            progress,
            caption,
            running_totals: running_totals.clone(),
            preview_jpeg,
        });

        frame_index += 1;
    }

    let decision = DecisionSummary::from_table(&table, &config.decision);
    let summary = metrics.summary();

    info!("✓ Video analyzed");
    info!("  Frames processed: {}", table.row_count());
    info!("  Total detections: {}", table.grand_total());
    info!("  Processing speed: {:.1} FPS", summary.fps);

    Ok(AnalysisReport {
        frames_processed: table.row_count() as u64,
        total_frames,
        table,
        decision,
        metrics: summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::SignalDecision;
    use std::collections::VecDeque;

    /// Yields blank frames, optionally failing after a number of reads.
    struct ScriptedSource {
        reported: u64,
        available: u64,
        fail_after: Option<u64>,
        read: u64,
    }

    impl ScriptedSource {
        fn new(reported: u64, available: u64) -> Self {
            Self {
                reported,
                available,
                fail_after: None,
                read: 0,
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn total_frames(&self) -> u64 {
            self.reported
        }

        fn read_frame(&mut self) -> Result<Option<Frame>> {
            if let Some(n) = self.fail_after {
                if self.read >= n {
                    anyhow::bail!("decoder error");
                }
            }
            if self.read >= self.available {
                return Ok(None);
            }
            self.read += 1;
            Ok(Some(Frame {
                data: vec![0; 8 * 8 * 3],
                width: 8,
                height: 8,
                timestamp_ms: self.read as f64 * 40.0,
            }))
        }
    }

    /// Returns a fixed list of class names per call, then nothing.
    struct ScriptedDetector {
        per_frame: VecDeque<Vec<&'static str>>,
    }

    impl ScriptedDetector {
        fn new(per_frame: Vec<Vec<&'static str>>) -> Self {
            Self {
                per_frame: per_frame.into(),
            }
        }

        fn repeat(classes: Vec<&'static str>, frames: usize) -> Self {
            Self::new(vec![classes; frames])
        }
    }

    impl VehicleDetector for ScriptedDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
            let classes = self.per_frame.pop_front().unwrap_or_default();
            Ok(classes
                .into_iter()
                .map(|name| Detection {
                    bbox: [1.0, 1.0, 4.0, 4.0],
                    confidence: 0.8,
                    class_id: 0,
                    class_name: name.to_string(),
                })
                .collect())
        }
    }

    struct FailingDetector;

    impl VehicleDetector for FailingDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
            anyhow::bail!("model exploded")
        }
    }

    struct NoopAnnotator;

    impl FrameAnnotator for NoopAnnotator {
        fn annotate(&self, _ctx: &FrameContext) -> Result<Vec<u8>> {
            Ok(vec![0xFF, 0xD8])
        }
    }

    struct BrokenAnnotator;

    impl FrameAnnotator for BrokenAnnotator {
        fn annotate(&self, _ctx: &FrameContext) -> Result<Vec<u8>> {
            anyhow::bail!("codec unavailable")
        }
    }

    #[test]
    fn test_one_row_per_frame_read() {
        let mut source = ScriptedSource::new(10, 10);
        let mut detector = ScriptedDetector::repeat(vec!["car", "car", "bus"], 10);
        let mut updates = Vec::new();

        let report = run_analysis(
            &mut source,
            &mut detector,
            &NoopAnnotator,
            &Config::default(),
            |u| updates.push(u),
        )
        .unwrap();

        assert_eq!(report.frames_processed, 10);
        assert_eq!(report.to_csv().lines().count(), 11);
        assert_eq!(updates.len(), 10);
        assert_eq!(updates[9].caption, "📹 Frame 10/10");
        assert!((updates[9].progress - 1.0).abs() < 1e-6);
        assert_eq!(updates[9].running_totals["car"], 20);
        assert!(updates[0].preview_jpeg.is_some());
    }

    #[test]
    fn test_stops_at_reported_frame_count() {
        let mut source = ScriptedSource::new(3, 8);
        let mut detector = ScriptedDetector::repeat(vec!["car"], 8);

        let report = run_analysis(
            &mut source,
            &mut detector,
            &NoopAnnotator,
            &Config::default(),
            |_| {},
        )
        .unwrap();

        assert_eq!(report.frames_processed, 3);
        assert_eq!(source.read, 3);
    }

    #[test]
    fn test_short_stream_ends_early() {
        let mut source = ScriptedSource::new(100, 4);
        let mut detector = ScriptedDetector::repeat(vec!["motorcycle"], 4);

        let report = run_analysis(
            &mut source,
            &mut detector,
            &NoopAnnotator,
            &Config::default(),
            |_| {},
        )
        .unwrap();

        assert_eq!(report.frames_processed, 4);
        assert_eq!(report.total_frames, 100);
        assert_eq!(report.cards().bikes, 4);
    }

    #[test]
    fn test_read_error_ends_loop_quietly() {
        let mut source = ScriptedSource::new(0, 50);
        source.fail_after = Some(6);
        let mut detector = ScriptedDetector::repeat(vec!["car"], 50);

        let report = run_analysis(
            &mut source,
            &mut detector,
            &NoopAnnotator,
            &Config::default(),
            |_| {},
        )
        .unwrap();

        assert_eq!(report.frames_processed, 6);
        assert_eq!(report.table.row_count(), 6);
    }

    #[test]
    fn test_detector_error_fails_session() {
        let mut source = ScriptedSource::new(5, 5);
        let result = run_analysis(
            &mut source,
            &mut FailingDetector,
            &NoopAnnotator,
            &Config::default(),
            |_| {},
        );

        let err = result.unwrap_err();
        assert!(format!("{:#}", err).contains("model exploded"));
    }

    #[test]
    fn test_report_decision_and_cards() {
        let mut source = ScriptedSource::new(4, 4);
        let mut detector = ScriptedDetector::new(vec![
            vec!["bus", "bus", "car"],
            vec!["bus", "bus"],
            vec![],
            vec!["bus", "bus", "motorcycle"],
        ]);

        let report = run_analysis(
            &mut source,
            &mut detector,
            &NoopAnnotator,
            &Config::default(),
            |_| {},
        )
        .unwrap();

        assert_eq!(
            report.cards(),
            MetricCards {
                cars: 1,
                buses: 6,
                bikes: 1
            }
        );
        assert_eq!(report.decision.decision, SignalDecision::BusPriority);
        assert_eq!(report.to_csv(), "bus,car,motorcycle\n2,1,0\n2,0,0\n0,0,0\n2,0,1\n");
    }

    #[test]
    fn test_class_filter_drops_other_labels() {
        let mut config = Config::default();
        config.detection.class_filter = vec!["car".into(), "bus".into()];

        let mut source = ScriptedSource::new(2, 2);
        let mut detector = ScriptedDetector::repeat(vec!["car", "person", "bus"], 2);

        let report =
            run_analysis(&mut source, &mut detector, &NoopAnnotator, &config, |_| {}).unwrap();

        assert_eq!(report.table.columns(), &["car", "bus"]);
        assert_eq!(report.table.grand_total(), 4);
    }

    #[test]
    fn test_annotation_failure_keeps_counting() {
        let mut source = ScriptedSource::new(5, 5);
        let mut detector = ScriptedDetector::repeat(vec!["car", "bus"], 5);
        let mut updates = Vec::new();

        let report = run_analysis(
            &mut source,
            &mut detector,
            &BrokenAnnotator,
            &Config::default(),
            |u| updates.push(u),
        )
        .unwrap();

        assert_eq!(report.frames_processed, 5);
        assert_eq!(report.to_csv(), "car,bus\n1,1\n1,1\n1,1\n1,1\n1,1\n");
        assert_eq!(updates.len(), 5);
        assert!(updates.iter().all(|u| u.preview_jpeg.is_none()));
        assert_eq!(updates[4].running_totals["bus"], 5);
    }
}
