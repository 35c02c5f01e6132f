//! Dark Circles Detection API
//!
//! Serves a YOLO dark-circle severity detector over HTTP.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                   DARK CIRCLES API                        │
//! ├───────────────────────────────────────────────────────────┤
//! │  ┌───────────┐   ┌──────────────┐   ┌──────────────────┐  │
//! │  │ Handlers  │──▶│  Pipeline    │──▶│ Advice lookup    │  │
//! │  │ (Axum)    │   │  (top det.)  │   └──────────────────┘  │
//! │  └─────┬─────┘   └──────┬───────┘                         │
//! │        │                ▼                                 │
//! │  ┌─────▼─────┐   ┌──────────────┐   ┌──────────────────┐  │
//! │  │  Camera   │   │  Detector    │◀──│ Loader           │  │
//! │  │ (OpenCV)  │   │  (ONNX RT)   │   │ (strategies)     │  │
//! │  └───────────┘   └──────────────┘   └──────────────────┘  │
//! └───────────────────────────────────────────────────────────┘
//! ```

pub mod advice;
pub mod camera;
pub mod config;
pub mod error;
pub mod handlers;
pub mod model;
pub mod pipeline;
pub mod stats;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use parking_lot::Mutex;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

pub use error::{AppError, AppResult};

use camera::VideoSource;
use config::Config;
use model::{Detector, ModelState};
use stats::InferenceStats;

/// Shared application state, built once at startup
#[derive(Clone)]
pub struct AppState {
    pub model: ModelState,
    pub config: Arc<Config>,
    pub camera: Arc<dyn VideoSource>,
    /// Serializes access to capture devices
    pub camera_lock: Arc<Mutex<()>>,
    pub stats: Arc<InferenceStats>,
}

impl AppState {
    pub fn new(model: ModelState, config: Config, camera: Arc<dyn VideoSource>) -> Self {
        Self {
            model,
            config: Arc::new(config),
            camera,
            camera_lock: Arc::new(Mutex::new(())),
            stats: Arc::new(InferenceStats::default()),
        }
    }

    /// The loaded detector, or 503
    pub fn detector(&self) -> AppResult<Arc<dyn Detector>> {
        self.model.handle.clone().ok_or(AppError::ServiceUnavailable)
    }
}

/// Create the main router with all routes
pub fn create_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state.config.cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    Router::new()
        .route("/", get(handlers::info::root))
        .route("/health", get(handlers::health::check))
        .route("/predict", post(handlers::predict::upload))
        .route("/predict/camera", post(handlers::predict::camera))
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}
