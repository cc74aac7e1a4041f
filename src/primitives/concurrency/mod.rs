#![forbid(unsafe_code)]

//! Readers-writer locks keyed by storage unit and file.
//!
//! Every file operation holds its unit's lock in shared mode and the file's
//! lock in shared (read) or exclusive (write) mode. Clearing a whole unit takes
//! the unit lock exclusively. Locks are always acquired unit first, then files
//! in sorted path order, so concurrent multi-file operations cannot deadlock.

use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{
    lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard},
    Mutex, RawRwLock, RwLock,
};
use rustc_hash::FxHashMap;

type SharedGuard = ArcRwLockReadGuard<RawRwLock, ()>;
type ExclusiveGuard = ArcRwLockWriteGuard<RawRwLock, ()>;
type LockMap<K> = Arc<Mutex<FxHashMap<K, Arc<RwLock<()>>>>>;

enum HeldLock {
    Shared(#[allow(dead_code)] SharedGuard),
    Exclusive(#[allow(dead_code)] ExclusiveGuard),
}

/// Drops the entries of `keys` nobody else references.
///
/// Callers that still wait on or hold a lock own a clone of its `Arc`, and
/// new clones are only handed out under the map mutex held here.
fn prune<K: Eq + Hash>(map: &Mutex<FxHashMap<K, Arc<RwLock<()>>>>, keys: &[K]) {
    let mut table = map.lock();
    for key in keys {
        if table.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            table.remove(key);
        }
    }
}

/// Locks held for the duration of one storage operation; released on drop.
pub struct AccessGuard {
    files: Vec<HeldLock>,
    unit: Option<HeldLock>,
    file_keys: Vec<PathBuf>,
    unit_key: String,
    file_map: LockMap<PathBuf>,
    unit_map: LockMap<String>,
}

impl AccessGuard {
    /// Number of file locks held.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Whether the unit lock is held exclusively.
    pub fn holds_unit_exclusively(&self) -> bool {
        matches!(self.unit, Some(HeldLock::Exclusive(_)))
    }
}

impl Drop for AccessGuard {
    fn drop(&mut self) {
        // Files before the unit, mirroring acquisition order.
        self.files.clear();
        prune(&self.file_map, &self.file_keys);
        self.unit = None;
        prune(&self.unit_map, std::slice::from_ref(&self.unit_key));
    }
}

/// Snapshot of the table size for observability.
#[derive(Default, Debug, Clone, Copy)]
pub struct LockSnapshot {
    /// Units currently locked or awaited.
    pub units: usize,
    /// Files currently locked or awaited.
    pub files: usize,
}

/// Lock registry shared by all operations of an executor. Entries exist only
/// while some guard holds or waits for them.
#[derive(Default)]
pub struct LockTable {
    units: LockMap<String>,
    files: LockMap<PathBuf>,
}

impl LockTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    fn unit_lock(&self, unit: &str) -> Arc<RwLock<()>> {
        self.units
            .lock()
            .entry(unit.to_owned())
            .or_default()
            .clone()
    }

    fn file_locks(&self, files: &[PathBuf]) -> (Vec<PathBuf>, Vec<Arc<RwLock<()>>>) {
        let mut sorted: Vec<&Path> = files.iter().map(PathBuf::as_path).collect();
        sorted.sort();
        sorted.dedup();
        let keys: Vec<PathBuf> = sorted.into_iter().map(Path::to_path_buf).collect();
        let mut table = self.files.lock();
        let locks = keys
            .iter()
            .map(|file| table.entry(file.clone()).or_default().clone())
            .collect();
        (keys, locks)
    }

    fn guard(
        &self,
        unit: &str,
        unit_lock: HeldLock,
        file_keys: Vec<PathBuf>,
        files: Vec<HeldLock>,
    ) -> AccessGuard {
        AccessGuard {
            files,
            unit: Some(unit_lock),
            file_keys,
            unit_key: unit.to_owned(),
            file_map: Arc::clone(&self.files),
            unit_map: Arc::clone(&self.units),
        }
    }

    /// Shared access to `files` of `unit`.
    pub fn read_files(&self, unit: &str, files: &[PathBuf]) -> AccessGuard {
        let unit_lock = HeldLock::Shared(self.unit_lock(unit).read_arc());
        let (keys, locks) = self.file_locks(files);
        let held = locks
            .iter()
            .map(|lock| HeldLock::Shared(lock.read_arc()))
            .collect();
        self.guard(unit, unit_lock, keys, held)
    }

    /// Exclusive access to `files` of `unit`.
    pub fn write_files(&self, unit: &str, files: &[PathBuf]) -> AccessGuard {
        let unit_lock = HeldLock::Shared(self.unit_lock(unit).read_arc());
        let (keys, locks) = self.file_locks(files);
        let held = locks
            .iter()
            .map(|lock| HeldLock::Exclusive(lock.write_arc()))
            .collect();
        self.guard(unit, unit_lock, keys, held)
    }

    /// Shared access to the unit as a whole (directory listings).
    pub fn read_unit(&self, unit: &str) -> AccessGuard {
        let unit_lock = HeldLock::Shared(self.unit_lock(unit).read_arc());
        self.guard(unit, unit_lock, Vec::new(), Vec::new())
    }

    /// Exclusive access to every file of `unit`.
    pub fn clear_unit(&self, unit: &str) -> AccessGuard {
        let unit_lock = HeldLock::Exclusive(self.unit_lock(unit).write_arc());
        self.guard(unit, unit_lock, Vec::new(), Vec::new())
    }

    /// Returns the current table size.
    pub fn snapshot(&self) -> LockSnapshot {
        LockSnapshot {
            units: self.units.lock().len(),
            files: self.files.lock().len(),
        }
    }
}
