use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{TelemetryError, TelemetryResult};

// ─── Defaults ────────────────────────────────────────────────────

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("metrics.json")
}
fn default_cadence() -> u64 {
    1_000
}
fn default_max_events() -> usize {
    1_000_000
}
fn default_top_endpoints() -> usize {
    10
}
fn default_bind() -> String {
    "0.0.0.0:8000".into()
}
fn default_stream_interval_ms() -> u64 {
    500
}

// ─── Config types ────────────────────────────────────────────────

/// Top-level configuration file, one section per concern.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Values the telemetry core is constructed from.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Where the whole-state JSON snapshot lives.
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,

    /// Ingests between successive snapshot writes.
    #[serde(default = "default_cadence")]
    pub cadence: u64,

    /// Capacity of the rolling event history.
    #[serde(default = "default_max_events")]
    pub max_events: usize,

    /// How many endpoints the report ranks.
    #[serde(default = "default_top_endpoints")]
    pub top_endpoints: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Tick of the SSE report stream
    #[serde(default = "default_stream_interval_ms")]
    pub stream_interval_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
            cadence: default_cadence(),
            max_events: default_max_events(),
            top_endpoints: default_top_endpoints(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            stream_interval_ms: default_stream_interval_ms(),
        }
    }
}

// ─── Loading ─────────────────────────────────────────────────────

impl Config {
    /// Read and validate a TOML config file.
    pub fn load(path: &Path) -> TelemetryResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            TelemetryError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> TelemetryResult<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|e| TelemetryError::Config(e.to_string()))?;
        config.telemetry.validate()?;
        config.server.validate()?;
        Ok(config)
    }
}

impl TelemetryConfig {
    pub fn validate(&self) -> TelemetryResult<()> {
        if self.cadence == 0 {
            return Err(TelemetryError::Config(
                "telemetry.cadence must be at least 1".into(),
            ));
        }
        if self.max_events == 0 {
            return Err(TelemetryError::Config(
                "telemetry.max_events must be at least 1".into(),
            ));
        }
        if self.snapshot_path.as_os_str().is_empty() {
            return Err(TelemetryError::Config(
                "telemetry.snapshot_path must not be empty".into(),
            ));
        }
        Ok(())
    }
}

impl ServerConfig {
    fn validate(&self) -> TelemetryResult<()> {
        if self.stream_interval_ms == 0 {
            return Err(TelemetryError::Config(
                "server.stream_interval_ms must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
