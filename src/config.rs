//! Configuration module

use std::env;
use std::path::PathBuf;

/// Default detection confidence threshold
pub const DEFAULT_CONF_THRESHOLD: f32 = 0.25;

/// Default NMS IoU threshold (Ultralytics predict default)
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.7;

/// Default square model input size
pub const DEFAULT_INPUT_SIZE: u32 = 640;

/// Class names used when the model carries no `names` metadata
pub const DEFAULT_CLASS_NAMES: [&str; 4] = ["High", "Low", "Moderate", "No"];

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address
    pub host: String,

    /// Server port
    pub port: u16,

    /// Directory scanned for the `best*.onnx` artifact
    pub model_dir: PathBuf,

    /// Minimum detection confidence
    pub conf_threshold: f32,

    /// IoU threshold for non-maximum suppression
    pub iou_threshold: f32,

    /// Square input size the model was exported with
    pub input_size: u32,

    /// ONNX Runtime intra-op threads
    pub intra_threads: usize,

    /// Fallback class names, indexed by class id
    pub class_names: Vec<String>,

    /// Upload body limit in bytes
    pub max_upload_bytes: usize,

    /// Allowed CORS origins
    pub cors_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            model_dir: PathBuf::from("."),
            conf_threshold: DEFAULT_CONF_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            input_size: DEFAULT_INPUT_SIZE,
            intra_threads: 1,
            class_names: DEFAULT_CLASS_NAMES.iter().map(|s| s.to_string()).collect(),
            max_upload_bytes: 10 * 1024 * 1024,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            host: env::var("HOST").unwrap_or(defaults.host),

            port: parse_var("PORT").unwrap_or(defaults.port),

            model_dir: env::var("MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_dir),

            conf_threshold: parse_var("CONF_THRESHOLD")
                .filter(|c: &f32| (0.0..=1.0).contains(c))
                .unwrap_or(defaults.conf_threshold),

            iou_threshold: parse_var("IOU_THRESHOLD")
                .filter(|c: &f32| (0.0..=1.0).contains(c))
                .unwrap_or(defaults.iou_threshold),

            input_size: parse_var("INPUT_SIZE")
                .filter(|s: &u32| *s > 0)
                .unwrap_or(defaults.input_size),

            intra_threads: parse_var("INTRA_THREADS")
                .filter(|t: &usize| *t > 0)
                .unwrap_or(defaults.intra_threads),

            class_names: env::var("CLASS_NAMES")
                .ok()
                .map(|v| split_list(&v))
                .filter(|names| !names.is_empty())
                .unwrap_or(defaults.class_names),

            max_upload_bytes: parse_var("MAX_UPLOAD_BYTES").unwrap_or(defaults.max_upload_bytes),

            cors_origins: env::var("CORS_ORIGINS")
                .ok()
                .map(|v| split_list(&v))
                .filter(|origins| !origins.is_empty())
                .unwrap_or(defaults.cors_origins),
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Split a comma separated list, dropping empty entries
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
