// src/vehicle_detection.rs

use crate::pipeline::VehicleDetector;
use crate::types::{Config, Detection, Frame};
use anyhow::{Context, Result};
use ort::{
    execution_providers::CUDAExecutionProvider,
    session::{builder::GraphOptimizationLevel, Session},
};
use tracing::{debug, info};

const LETTERBOX_FILL: u8 = 114;

/// Letterbox geometry used to map model coordinates back to the source frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

pub struct YoloDetector {
    session: Session,
    input_size: usize,
    class_names: Vec<String>,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl YoloDetector {
    pub fn new(config: &Config) -> Result<Self> {
        info!("Loading YOLO model: {}", config.model.path);

        let mut builder = Session::builder()?;
        if config.inference.use_cuda {
            info!("Enabling CUDA execution provider");
            builder = builder
                .with_execution_providers([CUDAExecutionProvider::default().with_device_id(0).build()])?;
        }

        let session = builder
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.inference.num_threads)?
            .with_inter_threads(1)?
            .commit_from_file(&config.model.path)
            .with_context(|| format!("Failed to load model {}", config.model.path))?;

        info!(
            "✓ YOLO detector initialized ({} classes, {}px input)",
            config.model.class_names.len(),
            config.model.input_size
        );

        Ok(Self {
            session,
            input_size: config.model.input_size,
            class_names: config.model.class_names.clone(),
            confidence_threshold: config.detection.confidence_threshold,
            iou_threshold: config.detection.iou_threshold,
        })
    }

    fn infer(&mut self, input: Vec<f32>) -> Result<Vec<f32>> {
        let shape = [1, 3, self.input_size, self.input_size];
        let input_value =
            ort::value::Value::from_array((shape.as_slice(), input.into_boxed_slice()))?;

        let outputs = self.session.run(ort::inputs!["images" => input_value])?;
        let output = &outputs[0];
        let (_, data) = output.try_extract_tensor::<f32>()?;

        Ok(data.to_vec())
    }
}

impl VehicleDetector for YoloDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let (input, letterbox) = letterbox(&frame.data, frame.width, frame.height, self.input_size);
        let output = self.infer(input)?;

        let detections = decode_predictions(
            &output,
            &self.class_names,
            letterbox,
            self.confidence_threshold,
        )?;
        let detections = nms(detections, self.iou_threshold);

        debug!("Detected {} objects", detections.len());
        Ok(detections)
    }
}

/// Resize into a square canvas keeping aspect ratio, then normalize to CHW [0, 1].
pub fn letterbox(src: &[u8], src_w: usize, src_h: usize, target_size: usize) -> (Vec<f32>, Letterbox) {
    let scale = (target_size as f32 / src_w as f32).min(target_size as f32 / src_h as f32);
    let scaled_w = ((src_w as f32 * scale) as usize).clamp(1, target_size);
    let scaled_h = ((src_h as f32 * scale) as usize).clamp(1, target_size);

    // Whole-pixel offsets, the same ones used to map boxes back
    let pad_x = (target_size - scaled_w) / 2;
    let pad_y = (target_size - scaled_h) / 2;

    let resized = resize_bilinear(src, src_w, src_h, scaled_w, scaled_h);

    let mut canvas = vec![LETTERBOX_FILL; target_size * target_size * 3];
    for y in 0..scaled_h {
        let dst_y = y + pad_y;
        let src_row = y * scaled_w * 3;
        let dst_row = (dst_y * target_size + pad_x) * 3;
        canvas[dst_row..dst_row + scaled_w * 3]
            .copy_from_slice(&resized[src_row..src_row + scaled_w * 3]);
    }

    let plane = target_size * target_size;
    let mut input = vec![0.0f32; 3 * plane];
    for (i, pixel) in canvas.chunks_exact(3).enumerate() {
        for c in 0..3 {
            input[c * plane + i] = pixel[c] as f32 / 255.0;
        }
    }

    (
        input,
        Letterbox {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
        },
    )
}

/// Parse a `[1, 4 + C, N]` YOLO head: per anchor cx, cy, w, h then C class scores.
pub fn decode_predictions(
    output: &[f32],
    class_names: &[String],
    letterbox: Letterbox,
    conf_thresh: f32,
) -> Result<Vec<Detection>> {
    let num_classes = class_names.len();
    let stride = 4 + num_classes;
    if num_classes == 0 || output.len() % stride != 0 {
        anyhow::bail!(
            "Model output of {} values does not fit {} classes",
            output.len(),
            num_classes
        );
    }
    let anchors = output.len() / stride;

    let mut detections = Vec::new();
    for i in 0..anchors {
        let mut max_conf = 0.0f32;
        let mut best_class = 0;
        for c in 0..num_classes {
            let conf = output[anchors * (4 + c) + i];
            if conf > max_conf {
                max_conf = conf;
                best_class = c;
            }
        }

        if max_conf <= 0.0 || max_conf < conf_thresh {
            continue;
        }

        let cx = output[i];
        let cy = output[anchors + i];
        let w = output[anchors * 2 + i];
        let h = output[anchors * 3 + i];

        let Letterbox { scale, pad_x, pad_y } = letterbox;
        detections.push(Detection {
            bbox: [
                (cx - w / 2.0 - pad_x) / scale,
                (cy - h / 2.0 - pad_y) / scale,
                (cx + w / 2.0 - pad_x) / scale,
                (cy + h / 2.0 - pad_y) / scale,
            ],
            confidence: max_conf,
            class_id: best_class,
            class_name: class_names[best_class].clone(),
        });
    }

    Ok(detections)
}

fn resize_bilinear(src: &[u8], src_w: usize, src_h: usize, dst_w: usize, dst_h: usize) -> Vec<u8> {
    let mut dst = vec![0u8; dst_h * dst_w * 3];
    let x_ratio = src_w as f32 / dst_w as f32;
    let y_ratio = src_h as f32 / dst_h as f32;

    for dy in 0..dst_h {
        for dx in 0..dst_w {
            let sx = dx as f32 * x_ratio;
            let sy = dy as f32 * y_ratio;
            let sx0 = (sx.floor() as usize).min(src_w - 1);
            let sy0 = (sy.floor() as usize).min(src_h - 1);
            let sx1 = (sx0 + 1).min(src_w - 1);
            let sy1 = (sy0 + 1).min(src_h - 1);
            let fx = sx - sx0 as f32;
            let fy = sy - sy0 as f32;

            for c in 0..3 {
                let p00 = src[(sy0 * src_w + sx0) * 3 + c] as f32;
                let p10 = src[(sy0 * src_w + sx1) * 3 + c] as f32;
                let p01 = src[(sy1 * src_w + sx0) * 3 + c] as f32;
                let p11 = src[(sy1 * src_w + sx1) * 3 + c] as f32;

                let val = p00 * (1.0 - fx) * (1.0 - fy)
                    + p10 * fx * (1.0 - fy)
                    + p01 * (1.0 - fx) * fy
                    + p11 * fx * fy;

                dst[(dy * dst_w + dx) * 3 + c] = val.round() as u8;
            }
        }
    }
    dst
}

/// Per-class non-maximum suppression.
fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Detection> = Vec::new();
    for det in detections {
        let suppressed = keep.iter().any(|k| {
            k.class_id == det.class_id && calculate_iou(&k.bbox, &det.bbox) >= iou_threshold
        });
        if !suppressed {
            keep.push(det);
        }
    }
    keep
}

fn calculate_iou(box1: &[f32; 4], box2: &[f32; 4]) -> f32 {
    let x1 = box1[0].max(box2[0]);
    let y1 = box1[1].max(box2[1]);
    let x2 = box1[2].min(box2[2]);
    let y2 = box1[3].min(box2[3]);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area1 = (box1[2] - box1[0]) * (box1[3] - box1[1]);
    let area2 = (box2[2] - box2[0]) * (box2[3] - box2[1]);
    let union = area1 + area2 - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}
