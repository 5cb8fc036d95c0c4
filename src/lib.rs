//! request-telemetry: in-process request telemetry with durable snapshots.
//!
//! Every completed request becomes an [`metrics::Event`] in a bounded,
//! lock-guarded [`metrics::EventStore`]. A [`metrics::PersistenceController`]
//! rewrites a JSON snapshot of the whole store every `cadence` ingests, and
//! the query functions in [`metrics::query`] compute windowed rates, mean
//! latency and endpoint rankings from a copy of the store.
//!
//! ```text
//! timing middleware ──ingest()──▶ EventStore ──snapshot()──▶ PersistenceController ──▶ metrics.json
//!                                     │
//!                                     └──snapshot()──▶ query::metrics_report() ──▶ JSON / SSE / HTML
//! ```
//!
//! The `metrics` module has no HTTP dependency; `server`, `handlers`,
//! `middleware` and `dashboard` make up the axum host around it.

use std::sync::Arc;
use std::time::Duration;

pub mod config;
pub mod dashboard;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod server;

pub use config::{Config, ServerConfig, TelemetryConfig};
pub use error::{TelemetryError, TelemetryResult};
pub use metrics::{Event, Telemetry};

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// Telemetry core. The middleware ingests, report handlers read copies.
    pub telemetry: Arc<Telemetry>,

    /// Tick of the SSE report stream.
    pub stream_interval: Duration,
}
