//! Model loader
//!
//! Finds the `best*.onnx` artifact and turns it into a [`Detector`] by
//! walking an ordered list of [`LoadStrategy`] values. The first strategy
//! that succeeds wins; when all of them fail the service keeps running
//! without a model.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ort::session::{builder::GraphOptimizationLevel, Session};

use super::detector::{Detector, DetectorSettings, InferenceError, OnnxDetector};

/// File name fragment that marks the trained artifact
pub const MODEL_NAME_MARKER: &str = "best";

/// Model file extension
pub const MODEL_EXTENSION: &str = "onnx";

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("No best*.onnx model file found in {}", .0.display())]
    NotFound(PathBuf),

    #[error("Version compatibility error: {0}")]
    VersionIncompatible(String),

    #[error("Could not deserialize model: {0}")]
    Deserialize(String),
}

impl LoadError {
    /// Operator-facing hints for this failure
    pub fn guidance(&self) -> &'static [&'static str] {
        match self {
            LoadError::NotFound(_) => &[
                "Place the trained model (e.g. best.onnx) in the model directory",
                "Or point MODEL_DIR at the directory that holds it",
            ],
            LoadError::VersionIncompatible(_) => &[
                "The model was exported with a different ultralytics / opset version",
                "Re-export it with the current ultralytics version: yolo export model=best.pt format=onnx",
                "Or run `reexport-model` to rewrite the graph for the installed ONNX Runtime",
                "If the model was exported with a fixed image size, set INPUT_SIZE to match it",
            ],
            LoadError::Deserialize(_) => &[
                "The file is not a readable ONNX graph (truncated download or a raw .pt checkpoint?)",
                "Export the checkpoint to ONNX and restart the server",
            ],
        }
    }

    fn log(&self, strategy: &str) {
        tracing::error!("❌ Strategy '{}' failed: {}", strategy, self);
        tracing::warn!("Possible solutions:");
        for (i, hint) in self.guidance().iter().enumerate() {
            tracing::warn!("{}. {}", i + 1, hint);
        }
    }
}

/// Sort an ONNX Runtime error message into a load failure kind
pub fn classify_runtime_error(message: &str) -> LoadError {
    let lower = message.to_lowercase();
    let version_markers = [
        "opset",
        "ir version",
        "ir_version",
        "unsupported model",
        "not implemented",
        "could not find an implementation",
        "no schema registered",
        "unrecognized attribute",
        // fixed-size export fed a frame of the wrong INPUT_SIZE
        "invalid dimensions",
        "got invalid",
    ];

    if version_markers.iter().any(|m| lower.contains(m)) {
        LoadError::VersionIncompatible(message.to_string())
    } else {
        LoadError::Deserialize(message.to_string())
    }
}

impl From<InferenceError> for LoadError {
    fn from(err: InferenceError) -> Self {
        match err {
            // A graph that loads but has the wrong head was exported for another layout
            InferenceError::Shape(msg) => LoadError::VersionIncompatible(msg),
            InferenceError::Runtime(msg) | InferenceError::Tensor(msg) => classify_runtime_error(&msg),
        }
    }
}

// ============================================================================
// DISCOVERY
// ============================================================================

/// All candidate artifacts in `dir`, sorted by file name
pub fn find_candidates(dir: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Cannot read model directory {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut candidates: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_candidate(path))
        .collect();

    candidates.sort();
    candidates
}

fn is_candidate(path: &Path) -> bool {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name.to_lowercase(),
        None => return false,
    };
    let extension_matches = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(MODEL_EXTENSION))
        .unwrap_or(false);

    extension_matches && name.contains(MODEL_NAME_MARKER)
}

/// Pick the model artifact in `dir`
pub fn find_best_model(dir: &Path) -> Result<PathBuf, LoadError> {
    let mut candidates = find_candidates(dir).into_iter();
    let chosen = candidates.next().ok_or_else(|| LoadError::NotFound(dir.to_path_buf()))?;

    let ignored: Vec<_> = candidates.collect();
    if !ignored.is_empty() {
        tracing::warn!(
            "Several model files found, using {} and ignoring {:?}",
            chosen.display(),
            ignored
        );
    }

    Ok(chosen)
}

// ============================================================================
// STRATEGIES
// ============================================================================

/// One way of turning a model file into a detector
pub trait LoadStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn load(&self, path: &Path, settings: &DetectorSettings) -> Result<Arc<dyn Detector>, LoadError>;
}

/// Graph optimization applied while building the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Optimization {
    Disabled,
    Basic,
    Full,
}

impl Optimization {
    fn level(self) -> GraphOptimizationLevel {
        match self {
            Optimization::Disabled => GraphOptimizationLevel::Disable,
            Optimization::Basic => GraphOptimizationLevel::Level1,
            Optimization::Full => GraphOptimizationLevel::Level3,
        }
    }
}

/// Load through ONNX Runtime at a fixed optimization level
#[derive(Debug, Clone)]
pub struct OnnxStrategy {
    name: &'static str,
    optimization: Optimization,
}

impl OnnxStrategy {
    /// Full graph optimization
    pub fn optimized() -> Self {
        Self { name: "optimized", optimization: Optimization::Full }
    }

    /// No graph rewrites, tolerates kernels the runtime cannot fuse
    pub fn compat() -> Self {
        Self { name: "compat", optimization: Optimization::Disabled }
    }
}

impl LoadStrategy for OnnxStrategy {
    fn name(&self) -> &'static str {
        self.name
    }

    fn load(&self, path: &Path, settings: &DetectorSettings) -> Result<Arc<dyn Detector>, LoadError> {
        let session = build_session(path, self.optimization, settings.intra_threads, None)?;
        let detector = OnnxDetector::from_session(session, settings)?;
        tracing::info!("Classes: {:?}", detector.class_names());
        Ok(Arc::new(detector))
    }
}

/// Build an ONNX Runtime session, optionally writing the optimized graph to disk
pub fn build_session(
    path: &Path,
    optimization: Optimization,
    intra_threads: usize,
    optimized_output: Option<&Path>,
) -> Result<Session, LoadError> {
    if !path.exists() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }

    let runtime_err = |e: ort::Error| classify_runtime_error(&e.to_string());

    let mut builder = Session::builder()
        .map_err(runtime_err)?
        .with_optimization_level(optimization.level())
        .map_err(runtime_err)?
        .with_intra_threads(intra_threads)
        .map_err(runtime_err)?;

    if let Some(output) = optimized_output {
        builder = builder
            .with_optimized_model_path(output.to_string_lossy().into_owned())
            .map_err(runtime_err)?;
    }

    builder.commit_from_file(path).map_err(runtime_err)
}

// ============================================================================
// LOADER
// ============================================================================

/// Result of the startup load
#[derive(Clone, Default)]
pub struct ModelState {
    pub handle: Option<Arc<dyn Detector>>,
    pub path: Option<PathBuf>,
    pub strategy: Option<&'static str>,
}

impl ModelState {
    pub fn is_loaded(&self) -> bool {
        self.handle.is_some()
    }
}

impl std::fmt::Debug for ModelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelState")
            .field("loaded", &self.is_loaded())
            .field("path", &self.path)
            .field("strategy", &self.strategy)
            .finish()
    }
}

pub struct ModelLoader {
    strategies: Vec<Box<dyn LoadStrategy>>,
    settings: DetectorSettings,
}

impl ModelLoader {
    /// Loader with the default strategy order: optimized, then compat
    pub fn new(settings: DetectorSettings) -> Self {
        Self::with_strategies(
            settings,
            vec![Box::new(OnnxStrategy::optimized()), Box::new(OnnxStrategy::compat())],
        )
    }

    pub fn with_strategies(settings: DetectorSettings, strategies: Vec<Box<dyn LoadStrategy>>) -> Self {
        Self { strategies, settings }
    }

    /// Try each strategy in order on `path`; returns the last failure when all fail
    pub fn load_file(&self, path: &Path) -> Result<(Arc<dyn Detector>, &'static str), LoadError> {
        let mut last_error = LoadError::NotFound(path.to_path_buf());

        for strategy in &self.strategies {
            tracing::info!("Attempting to load model from {} (strategy: {})", path.display(), strategy.name());

            match strategy.load(path, &self.settings) {
                Ok(detector) => {
                    tracing::info!("✅ Model loaded successfully from {} (strategy: {})", path.display(), strategy.name());
                    return Ok((detector, strategy.name()));
                }
                Err(e) => {
                    e.log(strategy.name());
                    // A missing file won't appear for the next strategy
                    if matches!(e, LoadError::NotFound(_)) {
                        return Err(e);
                    }
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    /// Startup routine; never fails, a missing or broken model leaves the handle empty
    pub fn load_from_dir(&self, dir: &Path) -> ModelState {
        let path = match find_best_model(dir) {
            Ok(path) => path,
            Err(e) => {
                e.log("discovery");
                return ModelState::default();
            }
        };

        match self.load_file(&path) {
            Ok((detector, strategy)) => ModelState {
                handle: Some(detector),
                path: Some(path),
                strategy: Some(strategy),
            },
            Err(e) => {
                tracing::error!("Model unavailable, predictions will answer 503: {}", e);
                ModelState {
                    handle: None,
                    path: Some(path),
                    strategy: None,
                }
            }
        }
    }
}
