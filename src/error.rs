//! Error handling

use axum::{
    response::{IntoResponse, Response},
    http::StatusCode,
    Json,
};
use serde_json::json;

use crate::camera::CameraError;

pub type AppResult<T> = Result<T, AppError>;

/// Request-time errors surfaced as HTTP responses
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadInput(String),

    #[error("Upload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Model not loaded. Please check server logs.")]
    ServiceUnavailable,

    #[error("{0}")]
    DeviceError(String),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadInput(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AppError::DeviceError(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            AppError::DeviceError(msg) => tracing::error!("Camera error: {}", msg),
            AppError::Internal(msg) => tracing::error!("Internal error: {}", msg),
            AppError::ServiceUnavailable => tracing::warn!("Prediction requested without a loaded model"),
            AppError::BadInput(msg) => tracing::debug!("Rejected request: {}", msg),
            AppError::PayloadTooLarge(msg) => tracing::debug!("Rejected upload: {}", msg),
        }

        let body = Json(json!({
            "detail": self.to_string(),
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<CameraError> for AppError {
    fn from(err: CameraError) -> Self {
        AppError::DeviceError(err.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("Worker task failed: {}", err))
    }
}
