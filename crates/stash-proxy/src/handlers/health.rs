//! Health check handlers.

use axum::{Json, extract::State, http::StatusCode};
use chrono::Utc;
use serde::Serialize;
use stash_cache::Phase;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub cache_version: String,
    pub phase: Phase,
    pub uptime_seconds: i64,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        cache_version: state.worker.version().to_string(),
        phase: state.worker.phase(),
        uptime_seconds: (Utc::now() - state.started_at).num_seconds(),
    })
}

/// Ready once the worker has activated and is serving from its partitions.
pub async fn ready(State(state): State<Arc<AppState>>) -> StatusCode {
    match state.worker.phase() {
        Phase::Serving => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    }
}
