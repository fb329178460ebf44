//! Snapshot service interface.
//!
//! Snapshots are opaque artifacts produced and consumed by an external
//! dump/reload service. The orchestrator only asks for one before and after
//! a run; the JSON implementation here backs the in-memory CLI backend.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::error::StoreError;
use crate::store::MemoryStore;

/// Which end of a migration run a snapshot brackets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotPhase {
    /// Taken before any migration runs.
    Pre,
    /// Taken after the last migration.
    Post,
}

impl fmt::Display for SnapshotPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SnapshotPhase::Pre => "pre",
            SnapshotPhase::Post => "post",
        })
    }
}

/// Failure to produce or load a snapshot artifact.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Filesystem failure.
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The store refused to dump or load an image.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Produces opaque snapshot artifacts of the backing store.
pub trait SnapshotService {
    /// Dumps a snapshot for `phase` and returns the artifact path.
    fn dump(&self, phase: SnapshotPhase) -> Result<PathBuf, SnapshotError>;
}

/// JSON snapshot service over the in-memory backend.
///
/// Artifacts are named `<phase>Migration.<timestamp>.json`.
#[derive(Debug, Clone)]
pub struct JsonSnapshotService {
    dir: PathBuf,
    store: MemoryStore,
}

impl JsonSnapshotService {
    /// Creates a service writing artifacts under `dir`.
    pub fn new(dir: impl Into<PathBuf>, store: MemoryStore) -> Self {
        Self {
            dir: dir.into(),
            store,
        }
    }

    /// Restores a store from a snapshot artifact.
    pub fn load_store(path: impl AsRef<Path>) -> Result<MemoryStore, SnapshotError> {
        let raw = fs::read_to_string(path.as_ref())?;
        Ok(MemoryStore::from_json(&raw)?)
    }
}

impl SnapshotService for JsonSnapshotService {
    fn dump(&self, phase: SnapshotPhase) -> Result<PathBuf, SnapshotError> {
        fs::create_dir_all(&self.dir)?;
        let timestamp = time::OffsetDateTime::now_utc().unix_timestamp();
        let path = self.dir.join(format!("{phase}Migration.{timestamp}.json"));
        fs::write(&path, self.store.to_json()?)?;
        info!(phase = %phase, path = %path.display(), "snapshot.dumped");
        Ok(path)
    }
}
