use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::metrics::Event;
use crate::AppState;

/// Middleware that times every request, feeds the telemetry store, and adds
/// two response headers:
///
///   X-Response-Time-Us  — total handler wall time in microseconds
///   Server-Timing       — same value in the standard Server-Timing format
///
/// When an ingest lands on a cadence boundary the snapshot write goes to the
/// blocking pool so the response is not held up by disk I/O.
pub async fn timing_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    let start = Instant::now();
    let mut response = next.run(req).await;
    let elapsed = start.elapsed();
    let us = elapsed.as_micros();

    // ── Inject response headers ─────────────────────────────────
    if let Ok(val) = us.to_string().parse() {
        response.headers_mut().insert("X-Response-Time-Us", val);
    }

    let server_timing = format!("total;dur={:.3}", elapsed.as_secs_f64() * 1000.0);
    if let Ok(val) = server_timing.parse() {
        response.headers_mut().insert("Server-Timing", val);
    }

    // ── Telemetry ───────────────────────────────────────────────
    let event = Event::from_elapsed(Utc::now(), method.as_str(), path.as_str(), elapsed);
    if state.telemetry.ingest(event) {
        let telemetry = state.telemetry.clone();
        tokio::task::spawn_blocking(move || telemetry.persist_snapshot());
    }

    debug!(
        status = response.status().as_u16(),
        method = %method,
        path = %path,
        us = us as u64,
        "request completed"
    );

    response
}
