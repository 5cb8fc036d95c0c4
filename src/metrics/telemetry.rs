use chrono::{DateTime, Utc};
use tracing::info;

use super::persistence::PersistenceController;
use super::query::{self, MetricsReport};
use super::store::{EventStore, StoreState};
use super::Event;
use crate::config::TelemetryConfig;
use crate::error::TelemetryResult;

/// The telemetry subsystem of one process.
///
/// Built once at startup with `init()`, shared as `Arc<Telemetry>`, and
/// closed with `shutdown()`. All access to the event store goes through it.
pub struct Telemetry {
    store: EventStore,
    persistence: PersistenceController,
    top_endpoints: usize,
}

impl Telemetry {
    /// Restore the last snapshot (or start empty).
    ///
    /// Fails if a snapshot exists but is unreadable or inconsistent; the
    /// operator has to restore a backup or remove the file.
    pub fn init(config: &TelemetryConfig) -> TelemetryResult<Self> {
        config.validate()?;

        let store = EventStore::new(config.max_events);
        let persistence = PersistenceController::new(&config.snapshot_path, config.cadence);
        store.restore(persistence.load_or_init()?);

        info!(
            snapshot = %config.snapshot_path.display(),
            cadence = config.cadence,
            capacity = config.max_events,
            total_requests = store.total_count(),
            "telemetry initialised"
        );

        Ok(Self {
            store,
            persistence,
            top_endpoints: config.top_endpoints,
        })
    }

    /// Record one completed request, writing a snapshot inline when the
    /// ingest lands on a cadence boundary. Never fails.
    pub fn record(&self, event: Event) {
        let total = self.store.record(event);
        self.persistence.maybe_snapshot(&self.store, total);
    }

    /// Record one completed request without doing any I/O.
    ///
    /// Returns true when this ingest crossed a cadence boundary; the caller
    /// then owes exactly one `persist_snapshot()`, typically from a blocking
    /// task.
    pub fn ingest(&self, event: Event) -> bool {
        let total = self.store.record(event);
        self.persistence.is_boundary(total)
    }

    /// Copy the store and write it out. Failures are logged only.
    pub fn persist_snapshot(&self) -> bool {
        self.persistence.persist(&self.store.snapshot())
    }

    pub fn snapshot(&self) -> StoreState {
        self.store.snapshot()
    }

    /// Report over every standard window as of `now`.
    pub fn report(&self, now: DateTime<Utc>) -> MetricsReport {
        query::metrics_report(&self.store.snapshot(), now, self.top_endpoints)
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    pub fn persistence(&self) -> &PersistenceController {
        &self.persistence
    }

    /// Final flush on clean exit. Unlike the cadence writes, the error is
    /// returned so the host can report it.
    pub fn shutdown(&self, flush: bool) -> TelemetryResult<()> {
        if flush {
            self.persistence.write_snapshot(&self.store.snapshot())?;
        }
        info!(
            total_requests = self.store.total_count(),
            flushed = flush,
            "telemetry shut down"
        );
        Ok(())
    }
}
