// src/pipeline/frame_context.rs
//
// Everything known about one frame once detection has run on it.

use crate::counts::FrameCounts;
use crate::types::{Detection, Frame};

#[derive(Debug, Clone)]
pub struct FrameContext {
    /// Zero-based index of the frame within the video.
    pub frame_index: u64,
    /// Frame count reported by the container, 0 when unknown.
    pub total_frames: u64,
    pub frame: Frame,
    pub detections: Vec<Detection>,
    pub counts: FrameCounts,
}

impl FrameContext {
    pub fn new(frame_index: u64, total_frames: u64, frame: Frame, detections: Vec<Detection>) -> Self {
        let counts = FrameCounts::from_detections(&detections);
        Self {
            frame_index,
            total_frames,
            frame,
            detections,
            counts,
        }
    }

    /// Fraction of the video processed after this frame, in [0, 1].
    pub fn progress(&self) -> f32 {
        if self.total_frames == 0 {
            return 0.0;
        }
        ((self.frame_index + 1) as f32 / self.total_frames as f32).min(1.0)
    }

    pub fn caption(&self) -> String {
        if self.total_frames == 0 {
            format!("📹 Frame {}", self.frame_index + 1)
        } else {
            format!("📹 Frame {}/{}", self.frame_index + 1, self.total_frames)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_frame() -> Frame {
        Frame {
            data: vec![0; 4 * 4 * 3],
            width: 4,
            height: 4,
            timestamp_ms: 40.0,
        }
    }

    #[test]
    fn test_progress_and_caption() {
        let ctx = FrameContext::new(4, 10, blank_frame(), Vec::new());
        assert!((ctx.progress() - 0.5).abs() < 1e-6);
        assert_eq!(ctx.caption(), "📹 Frame 5/10");
        assert!(ctx.counts.is_empty());
    }

    #[test]
    fn test_unknown_length() {
        let ctx = FrameContext::new(2, 0, blank_frame(), Vec::new());
        assert_eq!(ctx.progress(), 0.0);
        assert_eq!(ctx.caption(), "📹 Frame 3");
    }
}
