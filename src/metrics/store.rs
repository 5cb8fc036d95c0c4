use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::Event;
use crate::error::{TelemetryError, TelemetryResult};

// ─── Public types ────────────────────────────────────────────────

/// Thread-safe event store.
/// The middleware calls `record()`, readers and the snapshot writer call
/// `snapshot()`. Every method holds the lock only for in-memory work.
pub struct EventStore {
    inner: Mutex<StoreState>,
    capacity: usize,
}

/// Whole-store state as of one lock acquisition.
///
/// This is both the unit of persistence (field names match the snapshot
/// file) and the read-only input of every query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreState {
    /// Lifetime number of recorded events.
    #[serde(rename = "total_requests")]
    pub total_count: u64,

    /// Most recent events, oldest first. Shared so that copying the state
    /// costs a refcount per event rather than two string clones.
    #[serde(rename = "requests_log")]
    pub recent_events: VecDeque<Arc<Event>>,

    /// Lifetime count per "METHOD path". Never decremented on eviction.
    #[serde(rename = "path_counts")]
    pub endpoint_counts: HashMap<String, u64>,
}

// ─── EventStore impl ─────────────────────────────────────────────

impl EventStore {
    /// `capacity` is clamped to at least one retained event.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(StoreState::default()),
            capacity: capacity.max(1),
        }
    }

    /// Record one event and return the lifetime total including it.
    ///
    /// Each total is returned to exactly one caller, which is what makes the
    /// cadence check race-free across concurrent ingests.
    pub fn record(&self, event: Event) -> u64 {
        let key = event.endpoint_key();
        let mut state = self.inner.lock();

        if state.recent_events.len() >= self.capacity {
            state.recent_events.pop_front();
        }
        state.recent_events.push_back(Arc::new(event));

        state.total_count += 1;
        *state.endpoint_counts.entry(key).or_insert(0) += 1;
        state.total_count
    }

    /// Independent copy of the whole state.
    pub fn snapshot(&self) -> StoreState {
        self.inner.lock().clone()
    }

    /// Replace the state wholesale. Only meant for startup, before any
    /// `record()`. If the restored history exceeds capacity, the oldest
    /// events are dropped.
    pub fn restore(&self, mut state: StoreState) {
        let excess = state.recent_events.len().saturating_sub(self.capacity);
        state.recent_events.drain(..excess);
        *self.inner.lock() = state;
    }

    pub fn total_count(&self) -> u64 {
        self.inner.lock().total_count
    }

    /// Number of events currently retained.
    pub fn len(&self) -> usize {
        self.inner.lock().recent_events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ─── StoreState impl ─────────────────────────────────────────────

impl StoreState {
    /// Check the relations between the three fields that `record()` keeps
    /// true. Used on state decoded from disk.
    pub fn check_invariants(&self) -> TelemetryResult<()> {
        let retained = self.recent_events.len() as u64;
        if self.total_count < retained {
            return Err(TelemetryError::SnapshotInvariant(format!(
                "total_requests ({}) is less than the {} stored events",
                self.total_count, retained
            )));
        }

        let mut sum: u64 = 0;
        for (key, count) in &self.endpoint_counts {
            sum = sum.checked_add(*count).ok_or_else(|| {
                TelemetryError::SnapshotInvariant(format!(
                    "path_counts overflow while adding {key:?}"
                ))
            })?;
        }
        if sum != self.total_count {
            return Err(TelemetryError::SnapshotInvariant(format!(
                "path_counts sum to {sum} but total_requests is {}",
                self.total_count
            )));
        }

        if let Some(bad) = self
            .recent_events
            .iter()
            .find(|e| !e.latency_seconds().is_finite() || e.latency_seconds() < 0.0)
        {
            return Err(TelemetryError::SnapshotInvariant(format!(
                "event {} has invalid process_time {}",
                bad.endpoint_key(),
                bad.latency_seconds()
            )));
        }

        Ok(())
    }
}
