use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        Html,
    },
    Json,
};
use chrono::Utc;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

use crate::dashboard::{self, MetricsTemplate};
use crate::metrics::MetricsReport;
use crate::AppState;

// ─── GET /api/metrics ────────────────────────────────────────────
/// Returns a single JSON report, useful for curl / debugging.

pub async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<MetricsReport> {
    Json(state.telemetry.report(Utc::now()))
}

// ─── GET /api/metrics/stream ─────────────────────────────────────
/// Server-Sent Events endpoint.
/// Pushes a full `MetricsReport` as JSON every `stream_interval`.

pub async fn metrics_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let interval = tokio::time::interval(state.stream_interval);

    let stream = IntervalStream::new(interval).map(move |_| {
        let report = state.telemetry.report(Utc::now());
        let json = serde_json::to_string(&report).unwrap_or_default();
        Ok(Event::default().data(json))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

// ─── GET /metrics ────────────────────────────────────────────────

pub async fn metrics_page(State(state): State<Arc<AppState>>) -> Html<String> {
    let report = state.telemetry.report(Utc::now());
    dashboard::render(MetricsTemplate::from_report(&report))
}
