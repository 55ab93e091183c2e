//! YOLO-family object detection through ONNX Runtime.
//!
//! Expects a single-output model with shape `[1, 4 + C, N]`: per candidate
//! a center-format box in input pixels followed by `C` class scores. Class
//! names come from configuration since ONNX exports rarely carry them.
//!
//! Execution provider selection:
//! - CUDA on Linux with NVIDIA GPU (when `cuda` feature enabled)
//! - CoreML on macOS
//! - CPU fallback on all platforms

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array2;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use redact_models::{BoundingBox, Region};
use tracing::{debug, info};

use super::object::{ObjectDetectionBackend, RawObject};
use super::SENSITIVE_CLASSES;
use crate::error::{MediaError, MediaResult};

/// Configuration for the ONNX object detector.
#[derive(Debug, Clone)]
pub struct OnnxObjectConfig {
    /// Path to ONNX model file
    pub model_path: PathBuf,
    /// Class names in model output order
    pub class_names: Vec<String>,
    /// Score floor before NMS
    pub confidence_threshold: f32,
    /// IoU threshold for NMS
    pub nms_threshold: f32,
    /// Square model input edge
    pub input_size: u32,
    /// Name of the output tensor
    pub output_name: String,
}

impl Default for OnnxObjectConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/pii_detector.onnx"),
            class_names: SENSITIVE_CLASSES.iter().map(|s| s.to_string()).collect(),
            confidence_threshold: 0.2,
            nms_threshold: 0.45,
            input_size: 640,
            output_name: "output0".to_string(),
        }
    }
}

/// Object detector backed by an ONNX Runtime session.
pub struct OnnxObjectBackend {
    session: Session,
    config: OnnxObjectConfig,
}

impl OnnxObjectBackend {
    /// Load the model. Fails if the file is missing or cannot be parsed.
    pub fn new(config: OnnxObjectConfig) -> MediaResult<Self> {
        if !config.model_path.exists() {
            return Err(MediaError::model_not_found(config.model_path.display().to_string()));
        }
        if config.class_names.is_empty() {
            return Err(MediaError::invalid_config("ONNX detector needs class names"));
        }

        let session = create_session(&config.model_path)?;
        info!(
            model_path = %config.model_path.display(),
            input_size = config.input_size,
            classes = config.class_names.len(),
            "ONNX object detector initialized"
        );
        Ok(Self { session, config })
    }

    /// Resize to the square input, scale to [0, 1], lay out as NCHW.
    fn preprocess(&self, frame: &RgbImage) -> anyhow::Result<Value> {
        let size = self.config.input_size;
        let resized = image::imageops::resize(frame, size, size, FilterType::Triangle);
        let (w, h) = (size as usize, size as usize);

        let mut chw = vec![0f32; 3 * h * w];
        for (x, y, pixel) in resized.enumerate_pixels() {
            let offset = y as usize * w + x as usize;
            for c in 0..3 {
                chw[c * h * w + offset] = pixel[c] as f32 / 255.0;
            }
        }

        let shape = vec![1usize, 3, h, w];
        Tensor::from_array((shape, chw.into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| anyhow!("failed to create tensor: {e}"))
    }

    fn run(&mut self, input: Value) -> anyhow::Result<(Vec<usize>, Vec<f32>)> {
        let outputs = self
            .session
            .run(ort::inputs![input])
            .map_err(|e| anyhow!("ONNX inference failed: {e}"))?;
        let output = outputs
            .get(self.config.output_name.as_str())
            .ok_or_else(|| anyhow!("missing {} tensor", self.config.output_name))?;
        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| anyhow!("failed to extract tensor: {e}"))?;
        let dims = shape.iter().map(|&d| d.max(0) as usize).collect();
        Ok((dims, data.to_vec()))
    }

    fn postprocess(
        &self,
        dims: &[usize],
        data: Vec<f32>,
        frame_width: u32,
        frame_height: u32,
    ) -> anyhow::Result<Vec<RawObject>> {
        let num_classes = self.config.class_names.len();
        let (features, candidates) = match dims {
            [1, f, n] | [f, n] => (*f, *n),
            other => return Err(anyhow!("unexpected output shape {other:?}")),
        };
        if features != 4 + num_classes {
            return Err(anyhow!(
                "model emits {} classes, {} names configured",
                features.saturating_sub(4),
                num_classes
            ));
        }

        let output = Array2::from_shape_vec((features, candidates), data)
            .context("reshaping model output")?;
        let rows = output.t();

        let input = self.config.input_size as f32;
        let scale_w = frame_width as f32 / input;
        let scale_h = frame_height as f32 / input;

        let mut hits: Vec<(usize, f32, BoundingBox)> = Vec::new();
        for i in 0..candidates {
            let (best_class, best_score) = (0..num_classes)
                .map(|c| (c, rows[[i, 4 + c]]))
                .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
            if best_score < self.config.confidence_threshold {
                continue;
            }

            let (cx, cy, w, h) = (rows[[i, 0]], rows[[i, 1]], rows[[i, 2]], rows[[i, 3]]);
            let bbox = BoundingBox::new(
                ((cx - w / 2.0) * scale_w) as f64,
                ((cy - h / 2.0) * scale_h) as f64,
                (w * scale_w) as f64,
                (h * scale_h) as f64,
            );
            hits.push((best_class, best_score, bbox));
        }

        let kept = non_maximum_suppression(hits, self.config.nms_threshold as f64);
        Ok(kept
            .into_iter()
            .map(|(class, score, bbox)| RawObject {
                label: self.config.class_names[class].clone(),
                confidence: score as f64,
                region: Region::Box(bbox),
            })
            .collect())
    }
}

impl ObjectDetectionBackend for OnnxObjectBackend {
    fn labels(&self) -> Vec<String> {
        self.config.class_names.clone()
    }

    fn infer(&mut self, frame: &RgbImage) -> anyhow::Result<Vec<RawObject>> {
        let input = self.preprocess(frame)?;
        let (dims, data) = self.run(input)?;
        let objects = self.postprocess(&dims, data, frame.width(), frame.height())?;
        debug!(count = objects.len(), "ONNX object detection completed");
        Ok(objects)
    }
}

/// Per-class NMS, highest score first.
fn non_maximum_suppression(
    mut hits: Vec<(usize, f32, BoundingBox)>,
    iou_threshold: f64,
) -> Vec<(usize, f32, BoundingBox)> {
    hits.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut keep: Vec<(usize, f32, BoundingBox)> = Vec::new();
    for hit in hits {
        let duplicate = keep
            .iter()
            .any(|k| k.0 == hit.0 && k.2.iou(&hit.2) > iou_threshold);
        if !duplicate {
            keep.push(hit);
        }
    }
    keep
}

/// Create ONNX Runtime session with automatic execution provider selection.
fn create_session(model_path: &Path) -> MediaResult<Session> {
    let model_bytes = std::fs::read(model_path)?;

    let builder = Session::builder()
        .map_err(|e| MediaError::internal(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| MediaError::internal(format!("Failed to set optimization level: {}", e)))?;

    #[cfg(all(target_os = "linux", feature = "cuda"))]
    {
        use ort::execution_providers::CUDAExecutionProvider;
        if let Ok(cuda_builder) = builder
            .clone()
            .with_execution_providers([CUDAExecutionProvider::default().build()])
        {
            if let Ok(session) = cuda_builder.commit_from_memory(&model_bytes) {
                info!("Using CUDA execution provider for object detection");
                return Ok(session);
            }
        }
        debug!("CUDA execution provider not available, trying alternatives");
    }

    #[cfg(target_os = "macos")]
    {
        use ort::execution_providers::CoreMLExecutionProvider;
        if let Ok(coreml_builder) = builder
            .clone()
            .with_execution_providers([CoreMLExecutionProvider::default().build()])
        {
            if let Ok(session) = coreml_builder.commit_from_memory(&model_bytes) {
                info!("Using CoreML execution provider for object detection");
                return Ok(session);
            }
        }
        debug!("CoreML execution provider not available, using CPU");
    }

    info!("Using CPU execution provider for object detection");
    builder
        .commit_from_memory(&model_bytes)
        .map_err(|e| MediaError::internal(format!("Failed to load ONNX model: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nms_per_class() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(1.0, 1.0, 10.0, 10.0);
        let kept = non_maximum_suppression(vec![(0, 0.6, b), (0, 0.9, a), (1, 0.5, b)], 0.45);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].1, 0.9);
        assert_eq!(kept[1].0, 1);
    }

    #[test]
    fn test_missing_model() {
        let config = OnnxObjectConfig {
            model_path: PathBuf::from("/nonexistent/model.onnx"),
            ..Default::default()
        };
        assert!(matches!(OnnxObjectBackend::new(config), Err(MediaError::ModelNotFound(_))));
    }
}
