pub mod persistence;
pub mod query;
pub mod store;
pub mod telemetry;

use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::Duration;

use crate::error::{TelemetryError, TelemetryResult};

pub use persistence::PersistenceController;
pub use query::{MetricsReport, Window, WindowStats};
pub use store::{EventStore, StoreState};
pub use telemetry::Telemetry;

/// One completed request, as handed over by the request-handling layer.
/// This is the "write" side: the middleware builds these and pushes them in.
///
/// Serialized with the field names of the snapshot file's `requests_log`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    timestamp: EventTime,
    method: String,
    path: String,
    #[serde(rename = "process_time")]
    latency_seconds: f64,
}

impl Event {
    /// Build an event. Negative or non-finite latencies are stored as zero.
    pub fn new(
        finished_at: DateTime<Utc>,
        method: impl Into<String>,
        path: impl Into<String>,
        latency_seconds: f64,
    ) -> Self {
        let latency_seconds = if latency_seconds.is_finite() && latency_seconds > 0.0 {
            latency_seconds
        } else {
            0.0
        };
        Self {
            timestamp: EventTime::At(finished_at),
            method: method.into(),
            path: path.into(),
            latency_seconds,
        }
    }

    pub fn from_elapsed(
        finished_at: DateTime<Utc>,
        method: impl Into<String>,
        path: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self::new(finished_at, method, path, elapsed.as_secs_f64())
    }

    pub fn timestamp(&self) -> &EventTime {
        &self.timestamp
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn latency_seconds(&self) -> f64 {
        self.latency_seconds
    }

    /// Aggregation key, e.g. "GET /health".
    pub fn endpoint_key(&self) -> String {
        endpoint_key(&self.method, &self.path)
    }
}

pub fn endpoint_key(method: &str, path: &str) -> String {
    format!("{method} {path}")
}

/// When an event finished.
///
/// Events recorded in-process always carry a parsed instant. Events restored
/// from a snapshot keep their raw text if it did not parse, so the file
/// round-trips and the event is only skipped by windowed queries.
#[derive(Debug, Clone, PartialEq)]
pub enum EventTime {
    At(DateTime<Utc>),
    Malformed(String),
}

impl EventTime {
    /// Accepts RFC 3339 with any offset, or an offset-less ISO-8601
    /// timestamp in the host's local time zone (what Python's
    /// `datetime.now().isoformat()` writes).
    pub fn parse(raw: &str) -> Self {
        Self::parse_in(raw, &Local)
    }

    /// As `parse`, with offset-less timestamps read in `tz`. A local time
    /// skipped by a DST jump is malformed; an ambiguous one takes the
    /// earlier instant.
    pub fn parse_in<Tz: TimeZone>(raw: &str, tz: &Tz) -> Self {
        if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
            return Self::At(t.with_timezone(&Utc));
        }
        let local = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .and_then(|naive| tz.from_local_datetime(&naive).earliest());
        match local {
            Some(t) => Self::At(t.with_timezone(&Utc)),
            None => Self::Malformed(raw.to_owned()),
        }
    }

    pub fn instant(&self) -> TelemetryResult<DateTime<Utc>> {
        match self {
            Self::At(t) => Ok(*t),
            Self::Malformed(raw) => Err(TelemetryError::MalformedEventTimestamp(raw.clone())),
        }
    }
}

impl Serialize for EventTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::At(t) => {
                serializer.serialize_str(&t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Self::Malformed(raw) => serializer.serialize_str(raw),
        }
    }
}

impl<'de> Deserialize<'de> for EventTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}
