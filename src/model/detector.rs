//! Inference Engine - ONNX Runtime Integration
//!
//! Wraps an Ultralytics YOLO detector exported to ONNX behind the
//! [`Detector`] trait so the prediction pipeline can swap in any model.

use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::postprocess::{self, HeadLayout};

/// Maximum detections kept after NMS
pub const MAX_DETECTIONS: usize = 300;

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// One box emitted by the model, in source image pixels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: usize,
    pub confidence: f32,
    /// x1, y1, x2, y2
    pub bbox: [f32; 4],
}

/// Knobs shared by every load strategy
#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub input_size: u32,
    pub iou_threshold: f32,
    pub intra_threads: usize,
    /// Used when the model has no `names` metadata
    pub fallback_class_names: Vec<String>,
}

impl From<&crate::config::Config> for DetectorSettings {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            input_size: config.input_size,
            iou_threshold: config.iou_threshold,
            intra_threads: config.intra_threads,
            fallback_class_names: config.class_names.clone(),
        }
    }
}

// ============================================================================
// ERROR HANDLING
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Tensor error: {0}")]
    Tensor(String),

    #[error("Inference failed: {0}")]
    Runtime(String),

    #[error("Unexpected output shape: {0}")]
    Shape(String),
}

// ============================================================================
// DETECTOR TRAIT
// ============================================================================

/// An inference-ready object detector
pub trait Detector: Send + Sync {
    /// Detections above `conf_threshold`, highest confidence first
    fn detect(&self, image: &RgbImage, conf_threshold: f32) -> Result<Vec<Detection>, InferenceError>;

    /// Class name for a class index
    fn class_name(&self, class_id: usize) -> Option<&str>;
}

// ============================================================================
// ONNX IMPLEMENTATION
// ============================================================================

pub struct OnnxDetector {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    class_names: Vec<String>,
    layout: HeadLayout,
    input_size: u32,
    iou_threshold: f32,
}

impl std::fmt::Debug for OnnxDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxDetector")
            .field("input_name", &self.input_name)
            .field("output_name", &self.output_name)
            .field("class_names", &self.class_names)
            .field("layout", &self.layout)
            .finish()
    }
}

impl OnnxDetector {
    /// Wrap a committed session, reading class names and probing the
    /// output head with a blank frame
    pub fn from_session(session: Session, settings: &DetectorSettings) -> Result<Self, InferenceError> {
        let input_name = session.inputs.first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "images".to_string());

        let output_name = session.outputs.first()
            .map(|o| o.name.clone())
            .ok_or_else(|| InferenceError::Shape("model defines no outputs".to_string()))?;

        let class_names = read_class_names(&session)
            .unwrap_or_else(|| {
                tracing::warn!(
                    "Model has no class names metadata, using configured names: {:?}",
                    settings.fallback_class_names
                );
                settings.fallback_class_names.clone()
            });

        let mut detector = Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            class_names,
            layout: HeadLayout { channels: 0, anchors: 0, transposed: false },
            input_size: settings.input_size,
            iou_threshold: settings.iou_threshold,
        };

        let size = settings.input_size as usize;
        let blank = Array4::<f32>::zeros((1, 3, size, size));
        let (shape, _) = detector.run(&blank)?;
        detector.layout = HeadLayout::from_shape(&shape, detector.class_names.len())?;

        tracing::debug!(
            "Detector ready: input={}, output={}, layout={:?}",
            detector.input_name, detector.output_name, detector.layout
        );

        Ok(detector)
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    /// Run the session, returning the first output's shape and data
    fn run(&self, input: &Array4<f32>) -> Result<(Vec<usize>, Vec<f32>), InferenceError> {
        let input = input.as_standard_layout();
        let input_tensor = TensorRef::from_array_view(&input)
            .map_err(|e| InferenceError::Tensor(e.to_string()))?;

        let mut session = self.session.lock();
        let outputs = session.run(ort::inputs![self.input_name.as_str() => input_tensor])
            .map_err(|e| InferenceError::Runtime(e.to_string()))?;

        let output = outputs.get(self.output_name.as_str())
            .ok_or_else(|| InferenceError::Runtime(format!("Output '{}' not found", self.output_name)))?;

        let (shape, data) = output.try_extract_tensor::<f32>()
            .map_err(|e| InferenceError::Tensor(e.to_string()))?;

        let shape: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        Ok((shape, data.to_vec()))
    }
}

impl Detector for OnnxDetector {
    fn detect(&self, image: &RgbImage, conf_threshold: f32) -> Result<Vec<Detection>, InferenceError> {
        let (tensor, letterbox) = postprocess::letterbox(image, self.input_size);
        let (shape, data) = self.run(&tensor)?;

        if shape[..] != self.layout.shape()[..] {
            return Err(InferenceError::Shape(format!(
                "output shape changed from {:?} to {:?}",
                self.layout.shape(),
                shape
            )));
        }
        postprocess::decode(&data, self.layout, &letterbox, conf_threshold, self.iou_threshold, MAX_DETECTIONS)
    }

    fn class_name(&self, class_id: usize) -> Option<&str> {
        self.class_names.get(class_id).map(String::as_str)
    }
}

fn read_class_names(session: &Session) -> Option<Vec<String>> {
    let metadata = session.metadata().ok()?;
    let raw = match metadata.custom("names") {
        Ok(Some(value)) => value,
        _ => return None,
    };
    postprocess::parse_class_names(&raw)
}
