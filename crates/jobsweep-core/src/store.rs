//! Dataset store: the canonical snapshot, swapped atomically.
//!
//! A store holds one `Arc<Snapshot>` behind an `RwLock`. Readers clone the
//! `Arc` and keep using whatever snapshot they obtained — a concurrent
//! `replace` never tears what they see and never blocks on them. Writers
//! swap the reference; they never edit records in place.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::error::AppError;
use crate::merge::sort_canonical;
use crate::models::Snapshot;

/// Atomic read/replace access to the canonical snapshot.
pub trait SnapshotStore: Send + Sync + Clone {
    /// Returns the current snapshot. Always fully formed, never partial.
    fn read(&self) -> Arc<Snapshot>;

    /// Atomically replace the snapshot. On error the previous snapshot
    /// remains authoritative and continues to serve readers.
    fn replace(&self, snapshot: Snapshot) -> Result<(), AppError>;
}

/// In-memory store. The starting point for tests and memory-only runs.
#[derive(Clone)]
pub struct MemoryStore {
    current: Arc<RwLock<Arc<Snapshot>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(Snapshot::empty()))),
        }
    }

    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(snapshot))),
        }
    }

    fn read_guard(&self) -> Arc<Snapshot> {
        let guard = self.current.read().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned store lock");
            poisoned.into_inner()
        });
        Arc::clone(&guard)
    }

    fn swap(&self, snapshot: Snapshot) {
        let mut guard = self.current.write().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned store lock");
            poisoned.into_inner()
        });
        *guard = Arc::new(snapshot);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore for MemoryStore {
    fn read(&self) -> Arc<Snapshot> {
        self.read_guard()
    }

    fn replace(&self, snapshot: Snapshot) -> Result<(), AppError> {
        self.swap(snapshot);
        Ok(())
    }
}

/// File-backed store: same swap semantics as [`MemoryStore`], plus the
/// snapshot is persisted as one JSON document on every replace.
///
/// The persisted document is the full [`Snapshot`] — a `{generated_at,
/// records}` object, not a bare record array — so reopening the file
/// restores the staleness timestamp along with the data.
///
/// Persistence is write-to-temp-file-then-rename in the target directory,
/// so a crash mid-write never corrupts the on-disk dataset. A failed write
/// surfaces as `StoreCommitError` and leaves the in-memory snapshot
/// untouched.
#[derive(Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    memory: MemoryStore,
}

impl JsonFileStore {
    /// Open a store at `path`, loading the existing dataset if present.
    ///
    /// The loaded records are re-sorted into canonical order in case the
    /// file was produced by an older build or edited by hand.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let path = path.into();
        let snapshot = match std::fs::read_to_string(&path) {
            Ok(text) => {
                let mut snapshot: Snapshot = serde_json::from_str(&text)?;
                sort_canonical(&mut snapshot.records);
                tracing::info!(
                    path = %path.display(),
                    records = snapshot.len(),
                    "Loaded dataset"
                );
                snapshot
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "No existing dataset, starting empty");
                Snapshot::empty()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            memory: MemoryStore::with_snapshot(snapshot),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, snapshot: &Snapshot) -> Result<(), AppError> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let json = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| AppError::StoreCommitError(e.to_string()))?;

        // Temp file in the same directory so the rename stays on one filesystem.
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| AppError::StoreCommitError(e.to_string()))?;
        tmp.write_all(&json)
            .map_err(|e| AppError::StoreCommitError(e.to_string()))?;
        tmp.persist(&self.path)
            .map_err(|e| AppError::StoreCommitError(e.to_string()))?;
        Ok(())
    }
}

impl SnapshotStore for JsonFileStore {
    fn read(&self) -> Arc<Snapshot> {
        self.memory.read()
    }

    fn replace(&self, snapshot: Snapshot) -> Result<(), AppError> {
        self.persist(&snapshot)?;
        self.memory.swap(snapshot);
        Ok(())
    }
}
