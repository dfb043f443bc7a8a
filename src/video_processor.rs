// src/video_processor.rs

use crate::pipeline::{FrameAnnotator, FrameContext, FrameSource};
use crate::types::{Detection, Frame};
use anyhow::{Context, Result};
use opencv::{
    core::{self, Mat},
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTraitConst},
};
use std::path::Path;
use tracing::info;

pub struct VideoReader {
    cap: VideoCapture,
    fps: f64,
    total_frames: i32,
    current_frame: i32,
}

impl VideoReader {
    pub fn open(path: &Path) -> Result<Self> {
        info!("Opening video: {}", path.display());

        let path_str = path
            .to_str()
            .with_context(|| format!("Non UTF-8 video path {}", path.display()))?;
        let cap = VideoCapture::from_file(path_str, videoio::CAP_ANY)?;

        if !cap.is_opened()? {
            anyhow::bail!("Failed to open video file {}", path.display());
        }

        let fps = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FPS)?;
        let total_frames = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_COUNT)? as i32;
        let width = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_WIDTH)? as i32;
        let height = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_HEIGHT)? as i32;

        info!(
            "Video properties: {}x{} @ {:.1} FPS, {} frames",
            width, height, fps, total_frames
        );

        Ok(Self {
            cap,
            fps,
            total_frames,
            current_frame: 0,
        })
    }

    pub fn release(&mut self) -> Result<()> {
        use opencv::videoio::VideoCaptureTrait;
        VideoCaptureTrait::release(&mut self.cap)?;
        Ok(())
    }
}

impl FrameSource for VideoReader {
    fn total_frames(&self) -> u64 {
        self.total_frames.max(0) as u64
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        use opencv::videoio::VideoCaptureTrait;

        let mut mat = Mat::default();

        if !VideoCaptureTrait::read(&mut self.cap, &mut mat)? || mat.empty() {
            return Ok(None);
        }

        self.current_frame += 1;
        let timestamp_ms = if self.fps > 0.0 {
            (self.current_frame as f64 / self.fps) * 1000.0
        } else {
            0.0
        };

        let mut rgb_mat = Mat::default();
        imgproc::cvt_color(&mat, &mut rgb_mat, imgproc::COLOR_BGR2RGB, 0)?;

        let data = rgb_mat.data_bytes()?.to_vec();

        Ok(Some(Frame {
            data,
            width: rgb_mat.cols() as usize,
            height: rgb_mat.rows() as usize,
            timestamp_ms,
        }))
    }
}

/// Draws boxes and "class conf" labels, then encodes the result as JPEG.
pub struct DetectionAnnotator {
    pub jpeg_quality: u8,
}

impl DetectionAnnotator {
    pub fn new(jpeg_quality: u8) -> Self {
        Self { jpeg_quality }
    }
}

impl FrameAnnotator for DetectionAnnotator {
    fn annotate(&self, ctx: &FrameContext) -> Result<Vec<u8>> {
        let frame = &ctx.frame;
        let mut output = draw_detections(&frame.data, frame.height as i32, &ctx.detections)?;

        imgproc::put_text(
            &mut output,
            &format!("Frame {} | {} vehicles", ctx.frame_index + 1, ctx.detections.len()),
            core::Point::new(12, 28),
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.7,
            core::Scalar::new(255.0, 255.0, 255.0, 0.0),
            2,
            imgproc::LINE_AA,
            false,
        )?;

        let rgb = output.data_bytes()?;
        encode_rgb_to_jpeg(rgb, frame.width, frame.height, self.jpeg_quality)
    }
}

fn class_color(class_id: usize) -> core::Scalar {
    // RGB order, the canvas stays in RGB until encoding
    const PALETTE: [(f64, f64, f64); 6] = [
        (255.0, 56.0, 56.0),
        (255.0, 157.0, 151.0),
        (255.0, 112.0, 31.0),
        (255.0, 178.0, 29.0),
        (72.0, 249.0, 10.0),
        (0.0, 194.0, 255.0),
    ];
    let (r, g, b) = PALETTE[class_id % PALETTE.len()];
    core::Scalar::new(r, g, b, 0.0)
}

fn draw_detections(frame: &[u8], height: i32, detections: &[Detection]) -> Result<Mat> {
    let mat = Mat::from_slice(frame)?;
    let mat = mat.reshape(3, height)?;
    let mut output = mat.try_clone()?;

    for det in detections {
        let color = class_color(det.class_id);
        let [x1, y1, x2, y2] = det.bbox;
        let rect = core::Rect::new(
            x1 as i32,
            y1 as i32,
            (x2 - x1).max(1.0) as i32,
            (y2 - y1).max(1.0) as i32,
        );

        imgproc::rectangle(&mut output, rect, color, 2, imgproc::LINE_8, 0)?;
        draw_label(
            &mut output,
            &format!("{} {:.2}", det.class_name, det.confidence),
            rect.x,
            rect.y,
            color,
        )?;
    }

    Ok(output)
}

/// Filled label box sitting on top of a detection.
fn draw_label(img: &mut Mat, text: &str, x: i32, y: i32, color: core::Scalar) -> Result<()> {
    let mut baseline = 0;
    let text_size =
        imgproc::get_text_size(text, imgproc::FONT_HERSHEY_SIMPLEX, 0.5, 1, &mut baseline)?;

    let pad = 3;
    let top = (y - text_size.height - pad * 2).max(0);

    imgproc::rectangle(
        img,
        core::Rect::new(x, top, text_size.width + pad * 2, text_size.height + pad * 2),
        color,
        -1,
        imgproc::LINE_8,
        0,
    )?;

    imgproc::put_text(
        img,
        text,
        core::Point::new(x + pad, top + text_size.height + pad),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.5,
        core::Scalar::new(255.0, 255.0, 255.0, 0.0),
        1,
        imgproc::LINE_AA,
        false,
    )?;

    Ok(())
}

pub fn encode_rgb_to_jpeg(rgb_data: &[u8], width: usize, height: usize, quality: u8) -> Result<Vec<u8>> {
    use image::{ImageBuffer, RgbImage};
    use std::io::Cursor;

    let expected_len = width * height * 3;
    if rgb_data.len() < expected_len {
        anyhow::bail!(
            "Frame buffer too small: {} bytes for {}x{}",
            rgb_data.len(),
            width,
            height
        );
    }

    let img: RgbImage =
        ImageBuffer::from_raw(width as u32, height as u32, rgb_data[..expected_len].to_vec())
            .context("Invalid frame dimensions")?;

    let mut buf = Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality);
    img.write_with_encoder(encoder)?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_jpeg() {
        let rgb = vec![90u8; 32 * 16 * 3];
        let jpeg = encode_rgb_to_jpeg(&rgb, 32, 16, 80).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_encode_rejects_short_buffer() {
        assert!(encode_rgb_to_jpeg(&[0u8; 10], 32, 16, 80).is_err());
    }
}
