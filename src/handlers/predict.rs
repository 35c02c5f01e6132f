//! Prediction handlers

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::QueryRejection,
        Multipart, Query, State,
    },
    http::StatusCode,
    Json,
};
use image::DynamicImage;
use serde::Deserialize;

use crate::camera;
use crate::model::Detector;
use crate::pipeline::{self, PredictionResult};
use crate::stats::InferenceStats;
use crate::{AppError, AppResult, AppState};

/// Multipart field carrying the upload
const FILE_FIELD: &str = "file";

#[derive(Debug, Deserialize)]
pub struct CameraQuery {
    #[serde(default)]
    pub camera_index: i32,
}

/// Predict dark circles severity from an uploaded image
pub async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Json<PredictionResult>> {
    let mut multipart = multipart.map_err(|e| AppError::BadInput(e.body_text()))?;

    let bytes = read_image_field(&mut multipart).await?;
    tracing::debug!("Received upload of {} bytes", bytes.len());

    let detector = state.detector()?;

    let conf = state.config.conf_threshold;
    let stats = state.stats.clone();

    let result = tokio::task::spawn_blocking(move || -> AppResult<PredictionResult> {
        let image = image::load_from_memory(&bytes)
            .map_err(|e| AppError::Internal(format!("Error processing image: {}", e)))?;
        run_pipeline(detector.as_ref(), &image, conf, &stats)
    })
    .await??;

    Ok(Json(result))
}

/// Capture one frame from a webcam and predict on it
pub async fn camera(
    State(state): State<AppState>,
    query: Result<Query<CameraQuery>, QueryRejection>,
) -> AppResult<Json<PredictionResult>> {
    let detector = state.detector()?;
    let Query(query) = query.map_err(|e| AppError::BadInput(e.body_text()))?;
    let index = query.camera_index;
    let conf = state.config.conf_threshold;

    let result = tokio::task::spawn_blocking(move || -> AppResult<PredictionResult> {
        let frame = {
            let _device = state.camera_lock.lock();
            camera::capture_rgb(state.camera.as_ref(), index)?
        };
        tracing::debug!("Captured {}x{} frame from camera {}", frame.width(), frame.height(), index);

        run_pipeline(detector.as_ref(), &DynamicImage::ImageRgb8(frame), conf, &state.stats)
    })
    .await??;

    Ok(Json(result))
}

/// Pull the `file` field, rejecting non-image content types before reading it
async fn read_image_field(multipart: &mut Multipart) -> AppResult<Bytes> {
    while let Some(field) = multipart.next_field().await.map_err(body_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let is_image = field.content_type()
            .map(|ct| ct.starts_with("image/"))
            .unwrap_or(false);
        if !is_image {
            return Err(AppError::BadInput("File must be an image".to_string()));
        }

        return field.bytes().await.map_err(body_error);
    }

    Err(AppError::BadInput("No file uploaded".to_string()))
}

/// Oversized uploads surface here once the body limit trips mid-stream
fn body_error(err: MultipartError) -> AppError {
    match err.status() {
        StatusCode::PAYLOAD_TOO_LARGE => AppError::PayloadTooLarge(err.body_text()),
        _ => AppError::BadInput(format!("Invalid multipart body: {}", err.body_text())),
    }
}

fn run_pipeline(
    detector: &dyn Detector,
    image: &DynamicImage,
    conf: f32,
    stats: &Arc<InferenceStats>,
) -> AppResult<PredictionResult> {
    let start = Instant::now();
    let result = pipeline::predict(detector, image, conf)
        .map_err(|e| AppError::Internal(format!("Error processing image: {}", e)))?;
    stats.record(start.elapsed());
    Ok(result)
}
