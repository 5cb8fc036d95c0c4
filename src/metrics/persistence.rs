//! Snapshot file loading and cadence-driven atomic rewrites.

use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

use super::store::{EventStore, StoreState};
use crate::error::{TelemetryError, TelemetryResult};

/// Owns the durability policy for one `EventStore`.
pub struct PersistenceController {
    path: PathBuf,
    cadence: u64,
    /// `total_count` of the newest state this process put on disk.
    /// Held for the whole write so concurrent boundaries serialize.
    last_written: Mutex<Option<u64>>,
    writes: AtomicU64,
}

impl PersistenceController {
    /// `cadence` is clamped to at least 1.
    pub fn new(path: impl Into<PathBuf>, cadence: u64) -> Self {
        Self {
            path: path.into(),
            cadence: cadence.max(1),
            last_written: Mutex::new(None),
            writes: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cadence(&self) -> u64 {
        self.cadence
    }

    /// Number of snapshot files written by this controller.
    pub fn snapshots_written(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Decode the snapshot file, or return the empty state if there is none.
    ///
    /// A file that exists but cannot be read, decoded or fails the store
    /// invariants is an error: discarding it would lose real history.
    pub fn load_or_init(&self) -> TelemetryResult<StoreState> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no snapshot found, starting empty");
                return Ok(StoreState::default());
            }
            Err(source) => {
                return Err(TelemetryError::SnapshotRead {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let state: StoreState =
            serde_json::from_slice(&bytes).map_err(|source| TelemetryError::SnapshotDecode {
                path: self.path.clone(),
                source,
            })?;
        state.check_invariants()?;

        *self.last_written.lock() = Some(state.total_count);
        info!(
            path = %self.path.display(),
            total_requests = state.total_count,
            stored = state.recent_events.len(),
            endpoints = state.endpoint_counts.len(),
            "snapshot loaded"
        );
        Ok(state)
    }

    /// Whether the ingest that produced `total_count` owes a snapshot.
    pub fn is_boundary(&self, total_count: u64) -> bool {
        total_count > 0 && total_count % self.cadence == 0
    }

    /// Call after every `record()` with the total it returned. On a cadence
    /// boundary, copies the store and writes it out. Returns whether a
    /// snapshot was written; failures are logged and not propagated.
    pub fn maybe_snapshot(&self, store: &EventStore, total_count: u64) -> bool {
        if !self.is_boundary(total_count) {
            return false;
        }
        self.persist(&store.snapshot())
    }

    /// Write `state`, logging instead of returning failures.
    pub fn persist(&self, state: &StoreState) -> bool {
        match self.write_snapshot(state) {
            Ok(()) => true,
            Err(e) => {
                error!(
                    error = %e,
                    total_requests = state.total_count,
                    "snapshot write failed, retrying at next boundary"
                );
                false
            }
        }
    }

    /// Atomically replace the snapshot file with `state`.
    ///
    /// The JSON goes to a temp file in the target directory, is synced, then
    /// renamed over the target, so a crash leaves either the old or the new
    /// file. A state older than one already written is skipped.
    pub fn write_snapshot(&self, state: &StoreState) -> TelemetryResult<()> {
        let mut last = self.last_written.lock();
        if let Some(written) = *last {
            if state.total_count < written {
                warn!(
                    total_requests = state.total_count,
                    on_disk = written,
                    "skipping stale snapshot"
                );
                return Ok(());
            }
        }

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let write_err = |source: std::io::Error| TelemetryError::SnapshotWrite {
            path: self.path.clone(),
            source,
        };

        let tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer(&mut writer, state)?;
            writer.flush().map_err(write_err)?;
        }
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;

        *last = Some(state.total_count);
        self.writes.fetch_add(1, Ordering::Relaxed);
        debug!(
            path = %self.path.display(),
            total_requests = state.total_count,
            stored = state.recent_events.len(),
            "snapshot written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Event;
    use chrono::Utc;

    fn ev(path: &str) -> Event {
        Event::new(Utc::now(), "GET", path, 0.05)
    }

    #[test]
    fn missing_file_gives_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let ctl = PersistenceController::new(dir.path().join("metrics.json"), 10);
        let state = ctl.load_or_init().unwrap();
        assert_eq!(state, StoreState::default());
    }

    #[test]
    fn undecodable_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        fs::write(&path, b"{\"total_requests\": 3, \"requests_log\": [").unwrap();

        let err = PersistenceController::new(&path, 10).load_or_init().unwrap_err();
        assert!(matches!(err, TelemetryError::SnapshotDecode { .. }));
    }

    #[test]
    fn negative_count_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        fs::write(
            &path,
            br#"{"total_requests": -1, "requests_log": [], "path_counts": {}}"#,
        )
        .unwrap();

        let err = PersistenceController::new(&path, 10).load_or_init().unwrap_err();
        assert!(matches!(err, TelemetryError::SnapshotDecode { .. }));
    }

    #[test]
    fn inconsistent_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        fs::write(
            &path,
            br#"{"total_requests": 10, "requests_log": [], "path_counts": {"GET /": 7}}"#,
        )
        .unwrap();

        let err = PersistenceController::new(&path, 10).load_or_init().unwrap_err();
        assert!(matches!(err, TelemetryError::SnapshotInvariant(_)));
    }

    #[test]
    fn negative_latency_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        fs::write(
            &path,
            br#"{"total_requests": 1,
                 "requests_log": [{"timestamp": "2024-01-01T00:00:00", "method": "GET", "path": "/", "process_time": -0.5}],
                 "path_counts": {"GET /": 1}}"#,
        )
        .unwrap();

        let err = PersistenceController::new(&path, 10).load_or_init().unwrap_err();
        assert!(matches!(err, TelemetryError::SnapshotInvariant(_)));
    }

    #[test]
    fn loads_file_written_by_python_service() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        fs::write(
            &path,
            br#"{"total_requests": 4,
                 "requests_log": [
                    {"timestamp": "2024-05-01T12:34:56.123456", "method": "POST", "path": "/upload-image/", "process_time": 0.81},
                    {"timestamp": "2024-05-01T12:35:01.000001", "method": "GET", "path": "/health", "process_time": 0.02}
                 ],
                 "path_counts": {"POST /upload-image/": 3, "GET /health": 1}}"#,
        )
        .unwrap();

        let state = PersistenceController::new(&path, 10).load_or_init().unwrap();
        assert_eq!(state.total_count, 4);
        assert_eq!(state.recent_events.len(), 2);
        assert!(state.recent_events[0].timestamp().instant().is_ok());
    }

    #[test]
    fn write_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        let store = EventStore::new(10);
        store.record(ev("/a"));
        store.record(ev("/b"));

        let ctl = PersistenceController::new(&path, 10);
        ctl.write_snapshot(&store.snapshot()).unwrap();

        let loaded = PersistenceController::new(&path, 10).load_or_init().unwrap();
        assert_eq!(loaded, store.snapshot());
    }

    #[test]
    fn writes_once_per_cadence() {
        let dir = tempfile::tempdir().unwrap();
        let ctl = PersistenceController::new(dir.path().join("metrics.json"), 3);
        let store = EventStore::new(100);

        let mut written = Vec::new();
        for i in 0..3 {
            let total = store.record(ev(&format!("/{i}")));
            written.push(ctl.maybe_snapshot(&store, total));
        }
        assert_eq!(written, vec![false, false, true]);
        assert_eq!(ctl.snapshots_written(), 1);

        for i in 3..5 {
            let total = store.record(ev(&format!("/{i}")));
            assert!(!ctl.maybe_snapshot(&store, total));
        }
        assert_eq!(ctl.snapshots_written(), 1);

        let on_disk = PersistenceController::new(ctl.path(), 3).load_or_init().unwrap();
        assert_eq!(on_disk.total_count, 3);
    }

    #[test]
    fn failed_write_is_reported_and_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let ctl = PersistenceController::new(dir.path().join("missing/metrics.json"), 1);
        let store = EventStore::new(10);

        let total = store.record(ev("/"));
        assert!(!ctl.maybe_snapshot(&store, total));
        assert_eq!(ctl.snapshots_written(), 0);

        // Ingestion continues and the next boundary retries.
        fs::create_dir(dir.path().join("missing")).unwrap();
        let total = store.record(ev("/"));
        assert!(ctl.maybe_snapshot(&store, total));
        assert_eq!(ctl.snapshots_written(), 1);
    }

    #[test]
    fn write_error_variant_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope/metrics.json");
        let err = PersistenceController::new(&path, 1)
            .write_snapshot(&StoreState::default())
            .unwrap_err();
        assert!(matches!(err, TelemetryError::SnapshotWrite { .. }));
        assert!(err.to_string().contains("metrics.json"));
    }

    #[test]
    fn stale_state_does_not_overwrite_newer() {
        let dir = tempfile::tempdir().unwrap();
        let ctl = PersistenceController::new(dir.path().join("metrics.json"), 1);
        let store = EventStore::new(10);

        store.record(ev("/"));
        let older = store.snapshot();
        store.record(ev("/"));
        let newer = store.snapshot();

        ctl.write_snapshot(&newer).unwrap();
        ctl.write_snapshot(&older).unwrap();

        assert_eq!(ctl.snapshots_written(), 1);
        let on_disk = PersistenceController::new(ctl.path(), 1).load_or_init().unwrap();
        assert_eq!(on_disk.total_count, 2);
    }

    #[test]
    fn no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let ctl = PersistenceController::new(dir.path().join("metrics.json"), 1);
        let store = EventStore::new(10);
        for _ in 0..3 {
            let total = store.record(ev("/"));
            ctl.maybe_snapshot(&store, total);
        }

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
