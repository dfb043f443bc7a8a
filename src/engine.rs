// src/engine.rs
//
// The one call the web layer makes: analyze a video file end to end.

use crate::pipeline::{AnalysisReport, FrameUpdate};
use anyhow::Result;
use std::path::Path;

pub trait VideoAnalyzer: Send + Sync {
    /// Blocking. `on_frame` is invoked after every processed frame.
    fn analyze(&self, path: &Path, on_frame: &mut dyn FnMut(FrameUpdate)) -> Result<AnalysisReport>;
}

#[cfg(feature = "vision")]
pub use onnx::OnnxVideoAnalyzer;

#[cfg(feature = "vision")]
mod onnx {
    use super::VideoAnalyzer;
    use crate::pipeline::{run_analysis, AnalysisReport, FrameUpdate};
    use crate::types::Config;
    use crate::vehicle_detection::YoloDetector;
    use crate::video_processor::{DetectionAnnotator, VideoReader};
    use anyhow::{anyhow, Result};
    use std::path::Path;
    use std::sync::Mutex;
    use tracing::warn;

    /// opencv decoding + ONNX YOLO detection. The model is loaded once.
    pub struct OnnxVideoAnalyzer {
        config: Config,
        detector: Mutex<YoloDetector>,
    }

    impl OnnxVideoAnalyzer {
        pub fn new(config: Config) -> Result<Self> {
            let detector = YoloDetector::new(&config)?;
            Ok(Self {
                config,
                detector: Mutex::new(detector),
            })
        }
    }

    impl VideoAnalyzer for OnnxVideoAnalyzer {
        fn analyze(
            &self,
            path: &Path,
            on_frame: &mut dyn FnMut(FrameUpdate),
        ) -> Result<AnalysisReport> {
            let mut detector = self
                .detector
                .lock()
                .map_err(|_| anyhow!("Detector lock poisoned"))?;

            let mut reader = VideoReader::open(path)?;
            let annotator = DetectionAnnotator::new(self.config.video.preview_jpeg_quality);

            let result = run_analysis(
                &mut reader,
                &mut *detector,
                &annotator,
                &self.config,
                on_frame,
            );

            if let Err(e) = reader.release() {
                warn!("Failed to release video handle: {:#}", e);
            }

            result
        }
    }
}
