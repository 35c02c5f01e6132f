//! Model Module - detection model loading and inference

pub mod detector;
pub mod loader;
pub mod postprocess;

// Re-export common types
pub use detector::{Detection, Detector, DetectorSettings, InferenceError, OnnxDetector};
pub use loader::{LoadError, LoadStrategy, ModelLoader, ModelState, OnnxStrategy};
