//! SnapshotStore — the single piece of state shared between the refresher
//! and scrape handlers.
//!
//! The current snapshot lives behind an `ArcSwapOption`, so `current()` is a
//! lock-free pointer load and `publish()` is a pointer store. File-backed
//! stores additionally write the snapshot as JSON to `<cache_file>.new` and
//! rename it over `<cache_file>` before the swap; the in-memory variant only
//! swaps.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use tracing::{debug, info, warn};

use zvm_core::Snapshot;

use crate::error::{CacheError, CacheResult};

/// Convert any `Display` error into a `CacheError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| CacheError::$variant(e.to_string())
    };
}

struct Inner {
    current: ArcSwapOption<Snapshot>,
    /// Duration of the most recent fetch cycle, successful or not, in nanoseconds.
    last_fetch_nanos: AtomicU64,
    /// Persistence target. `None` for in-memory stores.
    path: Option<PathBuf>,
    /// Serializes writers so two publishes never share the temp file.
    write_lock: Mutex<()>,
}

/// Thread-safe snapshot cache. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SnapshotStore {
    inner: Arc<Inner>,
}

impl SnapshotStore {
    /// Create an empty store that keeps snapshots in memory only.
    pub fn in_memory() -> Self {
        debug!("in-memory snapshot store created");
        Self::with_parts(None, None)
    }

    /// Open a file-backed store at `path`.
    ///
    /// A snapshot left by a previous run is loaded and served immediately
    /// with its original capture time. A missing file gives an empty store;
    /// so does an unreadable one, after a warning.
    pub fn open(path: &Path) -> CacheResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(map_err!(Persistence))?;
            }
        }

        let initial = match load(path) {
            Ok(Some(snapshot)) => {
                info!(
                    ?path,
                    resources = snapshot.resources.len(),
                    age_secs = snapshot.age().as_secs(),
                    "loaded persisted snapshot"
                );
                Some(snapshot)
            }
            Ok(None) => {
                debug!(?path, "no persisted snapshot");
                None
            }
            Err(e) => {
                warn!(?path, error = %e, "ignoring unreadable snapshot file");
                None
            }
        };

        Ok(Self::with_parts(Some(path.to_path_buf()), initial))
    }

    fn with_parts(path: Option<PathBuf>, initial: Option<Snapshot>) -> Self {
        let last_fetch = initial
            .as_ref()
            .map(|s| duration_to_nanos(s.fetch_duration))
            .unwrap_or(0);
        Self {
            inner: Arc::new(Inner {
                current: ArcSwapOption::new(initial.map(Arc::new)),
                last_fetch_nanos: AtomicU64::new(last_fetch),
                path,
                write_lock: Mutex::new(()),
            }),
        }
    }

    /// Replace the current snapshot.
    ///
    /// For file-backed stores the snapshot is durable before it becomes
    /// visible. On error nothing changes: readers keep the previous snapshot.
    pub fn publish(&self, snapshot: Snapshot) -> CacheResult<Arc<Snapshot>> {
        let snapshot = Arc::new(snapshot);
        // Poisoning only means an earlier publish panicked; the staging file is rewritten anyway.
        let _guard = self
            .inner
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(path) = &self.inner.path {
            persist(path, &snapshot)?;
        }

        self.inner.current.store(Some(snapshot.clone()));
        self.record_fetch_duration(snapshot.fetch_duration);
        debug!(
            resources = snapshot.resources.len(),
            fetch_ms = snapshot.fetch_duration.as_millis() as u64,
            "snapshot published"
        );
        Ok(snapshot)
    }

    /// The latest snapshot and its age.
    pub fn current(&self) -> CacheResult<(Arc<Snapshot>, Duration)> {
        let snapshot = self.inner.current.load_full().ok_or(CacheError::NotReady)?;
        let age = snapshot.age();
        Ok((snapshot, age))
    }

    /// Whether at least one snapshot is available.
    pub fn is_ready(&self) -> bool {
        self.inner.current.load().is_some()
    }

    /// Duration of the most recent fetch cycle.
    pub fn last_fetch_duration(&self) -> Duration {
        Duration::from_nanos(self.inner.last_fetch_nanos.load(Ordering::Acquire))
    }

    /// Record the duration of a cycle that did not publish.
    pub fn record_fetch_duration(&self, duration: Duration) {
        self.inner
            .last_fetch_nanos
            .store(duration_to_nanos(duration), Ordering::Release);
    }

    /// Persistence target, if file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }
}

fn duration_to_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// `<path>.new`, the staging file renamed into place on publish.
fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".new");
    PathBuf::from(name)
}

fn load(path: &Path) -> CacheResult<Option<Snapshot>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CacheError::Persistence(e.to_string())),
    };
    let snapshot = serde_json::from_slice(&bytes).map_err(map_err!(Deserialize))?;
    Ok(Some(snapshot))
}

fn persist(path: &Path, snapshot: &Snapshot) -> CacheResult<()> {
    let bytes = serde_json::to_vec(snapshot).map_err(map_err!(Serialize))?;
    let staging = staging_path(path);

    let written = File::create(&staging).and_then(|mut file| {
        file.write_all(&bytes)?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&staging);
        return Err(CacheError::Persistence(format!(
            "write {}: {e}",
            staging.display()
        )));
    }

    if let Err(e) = fs::rename(&staging, path) {
        let _ = fs::remove_file(&staging);
        return Err(CacheError::Persistence(format!(
            "rename {} -> {}: {e}",
            staging.display(),
            path.display()
        )));
    }

    debug!(?path, bytes = bytes.len(), "snapshot persisted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::SystemTime;
    use zvm_core::Measurements;

    fn snapshot_with(host: &str, used: f64, total: f64, fetch: Duration) -> Snapshot {
        let mut m = Measurements::new();
        m.insert("disk_used".to_string(), used);
        m.insert("disk_total".to_string(), total);
        let mut resources = BTreeMap::new();
        resources.insert(host.to_string(), m);
        Snapshot::new(resources, fetch)
    }

    /// A snapshot whose every measurement carries the same value.
    fn uniform_snapshot(value: f64, resources: usize) -> Snapshot {
        let resources = (0..resources)
            .map(|i| {
                let mut m = Measurements::new();
                m.insert("disk_used".to_string(), value);
                m.insert("disk_total".to_string(), value);
                (format!("host-{i}"), m)
            })
            .collect();
        Snapshot::new(resources, Duration::from_millis(1))
    }

    #[test]
    fn empty_store_is_not_ready() {
        let store = SnapshotStore::in_memory();
        assert!(!store.is_ready());
        assert!(matches!(store.current(), Err(CacheError::NotReady)));
        assert_eq!(store.last_fetch_duration(), Duration::ZERO);
    }

    #[test]
    fn publish_makes_snapshot_current() {
        let store = SnapshotStore::in_memory();
        let fetch = Duration::from_millis(250);
        store.publish(snapshot_with("hostA", 10.0, 100.0, fetch)).unwrap();

        let (snapshot, age) = store.current().unwrap();
        assert!(age < Duration::from_millis(500), "age was {age:?}");
        assert_eq!(snapshot.resources["hostA"]["disk_used"], 10.0);
        assert_eq!(store.last_fetch_duration(), fetch);
        assert!(store.is_ready());
    }

    #[test]
    fn publish_replaces_whole_snapshot() {
        let store = SnapshotStore::in_memory();
        store.publish(snapshot_with("hostA", 10.0, 100.0, Duration::ZERO)).unwrap();
        store.publish(snapshot_with("hostB", 20.0, 200.0, Duration::ZERO)).unwrap();

        let (snapshot, _) = store.current().unwrap();
        assert!(!snapshot.resources.contains_key("hostA"));
        assert_eq!(snapshot.resources["hostB"]["disk_total"], 200.0);
    }

    #[test]
    fn record_fetch_duration_keeps_snapshot() {
        let store = SnapshotStore::in_memory();
        store
            .publish(snapshot_with("hostA", 10.0, 100.0, Duration::from_millis(5)))
            .unwrap();
        let (before, _) = store.current().unwrap();

        store.record_fetch_duration(Duration::from_secs(3));
        let (after, _) = store.current().unwrap();

        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(store.last_fetch_duration(), Duration::from_secs(3));
    }

    #[test]
    fn current_twice_returns_same_snapshot() {
        let store = SnapshotStore::in_memory();
        store.publish(snapshot_with("hostA", 10.0, 100.0, Duration::ZERO)).unwrap();

        let (first, age1) = store.current().unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let (second, age2) = store.current().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*first, *second);
        assert!(age2 >= age1 + Duration::from_millis(20));
    }

    #[test]
    fn clones_share_state() {
        let store = SnapshotStore::in_memory();
        let reader = store.clone();
        store.publish(snapshot_with("hostA", 1.0, 2.0, Duration::ZERO)).unwrap();
        assert!(reader.is_ready());
    }

    #[test]
    fn readers_never_see_torn_snapshots() {
        const RESOURCES: usize = 64;
        const ROUNDS: usize = 500;

        let store = SnapshotStore::in_memory();
        store.publish(uniform_snapshot(0.0, RESOURCES)).unwrap();

        std::thread::scope(|scope| {
            let writer = store.clone();
            scope.spawn(move || {
                for round in 1..=ROUNDS {
                    writer.publish(uniform_snapshot(round as f64, RESOURCES)).unwrap();
                }
            });

            for _ in 0..4 {
                let reader = store.clone();
                scope.spawn(move || {
                    for _ in 0..ROUNDS {
                        let (snapshot, _) = reader.current().unwrap();
                        assert_eq!(snapshot.resources.len(), RESOURCES);
                        let first = snapshot.resources["host-0"]["disk_used"];
                        for m in snapshot.resources.values() {
                            assert_eq!(m["disk_used"], first);
                            assert_eq!(m["disk_total"], first);
                        }
                    }
                });
            }
        });

        let (last, _) = store.current().unwrap();
        assert_eq!(last.resources["host-0"]["disk_used"], ROUNDS as f64);
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache").join("snapshot.json");

        let published = {
            let store = SnapshotStore::open(&path).unwrap();
            assert!(!store.is_ready());
            store
                .publish(snapshot_with("hostA", 10.5, 100.25, Duration::from_micros(1500)))
                .unwrap()
        };
        assert!(path.exists());
        assert!(!staging_path(&path).exists());

        let reopened = SnapshotStore::open(&path).unwrap();
        let (snapshot, _) = reopened.current().unwrap();
        assert_eq!(*snapshot, *published);
        assert_eq!(reopened.last_fetch_duration(), Duration::from_micros(1500));
        assert_eq!(reopened.path(), Some(path.as_path()));
    }

    #[test]
    fn reopened_snapshot_keeps_original_age() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");

        let mut old = snapshot_with("hostA", 1.0, 2.0, Duration::ZERO);
        old.captured_at = SystemTime::now() - Duration::from_secs(600);
        SnapshotStore::open(&path).unwrap().publish(old).unwrap();

        let (_, age) = SnapshotStore::open(&path).unwrap().current().unwrap();
        assert!(age >= Duration::from_secs(600));
    }

    #[test]
    fn corrupt_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        fs::write(&path, b"not json").unwrap();

        let store = SnapshotStore::open(&path).unwrap();
        assert!(matches!(store.current(), Err(CacheError::NotReady)));
    }

    #[test]
    fn failed_persist_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let store = SnapshotStore::open(&path).unwrap();
        store.publish(snapshot_with("hostA", 10.0, 100.0, Duration::ZERO)).unwrap();
        let (before, _) = store.current().unwrap();

        // A directory squatting on the staging path makes the write fail.
        fs::create_dir(staging_path(&path)).unwrap();

        let err = store
            .publish(snapshot_with("hostB", 20.0, 200.0, Duration::ZERO))
            .unwrap_err();
        assert!(matches!(err, CacheError::Persistence(_)));

        let (after, _) = store.current().unwrap();
        assert!(Arc::ptr_eq(&before, &after));

        let on_disk = SnapshotStore::open(&path).unwrap().current().unwrap().0;
        assert!(on_disk.resources.contains_key("hostA"));
    }

    #[test]
    fn in_memory_store_has_no_path() {
        assert!(SnapshotStore::in_memory().path().is_none());
    }
}
