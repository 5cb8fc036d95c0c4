pub mod metrics;

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub message: String,
    pub total_requests: u64,
}

// ─── GET / ───────────────────────────────────────────────────────

pub async fn root() -> Json<bool> {
    Json(true)
}

// ─── GET /health ─────────────────────────────────────────────────

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "healthy",
        message: "Server is running".into(),
        total_requests: state.telemetry.store().total_count(),
    })
}
