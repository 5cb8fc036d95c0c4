//! Error types for the telemetry core.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Errors raised by the event store, snapshot persistence and queries.
///
/// Load-time variants abort startup. Write-time variants are logged and
/// retried at the next cadence boundary. `MalformedEventTimestamp` only ever
/// excludes a single event from a windowed query.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to read snapshot {}: {source}", path.display())]
    SnapshotRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode snapshot {}: {source}", path.display())]
    SnapshotDecode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("snapshot violates store invariants: {0}")]
    SnapshotInvariant(String),

    #[error("failed to encode snapshot: {0}")]
    SnapshotEncode(#[from] serde_json::Error),

    #[error("failed to write snapshot {}: {source}", path.display())]
    SnapshotWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed event timestamp: {0:?}")]
    MalformedEventTimestamp(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}
