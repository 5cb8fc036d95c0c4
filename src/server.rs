use axum::{middleware as axum_mw, routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::handlers;
use crate::middleware::timing;
use crate::AppState;

/// Builds the full Axum `Router` with all routes and middleware.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // ── Service endpoints ───────────────────────────────────
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        // ── Metrics ─────────────────────────────────────────────
        .route("/metrics", get(handlers::metrics::metrics_page))
        .route("/api/metrics", get(handlers::metrics::get_metrics))
        .route("/api/metrics/stream", get(handlers::metrics::metrics_stream))
        // ── Provide shared state to all routes above ────────────
        .with_state(state.clone())
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(axum_mw::from_fn_with_state(state, timing::timing_middleware))
        .layer(CorsLayer::permissive())
}
