//! API metadata handler

use std::collections::BTreeMap;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::stats::StatsSnapshot;
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct InfoResponse {
    pub message: String,
    pub version: String,
    pub model_path: String,
    pub load_strategy: Option<String>,
    pub endpoints: BTreeMap<String, String>,
    pub stats: StatsSnapshot,
}

pub async fn root(State(state): State<AppState>) -> Json<InfoResponse> {
    let endpoints = [
        ("/predict", "POST - Upload an image to detect dark circles"),
        ("/predict/camera", "POST - Capture image from webcam and detect dark circles"),
        ("/health", "GET - Check API health status"),
    ]
    .into_iter()
    .map(|(path, description)| (path.to_string(), description.to_string()))
    .collect();

    // Discovered path is reported even when loading it failed
    let model_path = state.model.path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "Not loaded".to_string());

    Json(InfoResponse {
        message: "Dark Circles Detection API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model_path,
        load_strategy: state.model.strategy.map(str::to_string),
        endpoints,
        stats: state.stats.snapshot(),
    })
}
