use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::model::StateSnapshot;

/// Read-only access to the latest game state.
pub trait SnapshotReader: Send + Sync {
    /// Current snapshot, or `None` when no usable state is available.
    fn read(&self) -> Option<StateSnapshot>;
}

/// Reads a JSON snapshot exported by the indexer.
pub struct FileSnapshotReader {
    path: PathBuf,
}

impl FileSnapshotReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> io::Result<StateSnapshot> {
        let content = fs::read_to_string(&self.path)?;
        let snapshot = serde_json::from_str(&content)?;
        Ok(snapshot)
    }
}

impl SnapshotReader for FileSnapshotReader {
    fn read(&self) -> Option<StateSnapshot> {
        match self.load() {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                log::warn!("Failed to read snapshot {:?}: {}", self.path, e);
                None
            }
        }
    }
}

/// Always returns the same snapshot.
pub struct StaticSnapshotReader {
    snapshot: Option<StateSnapshot>,
}

impl StaticSnapshotReader {
    pub fn new(snapshot: StateSnapshot) -> Self {
        Self {
            snapshot: Some(snapshot),
        }
    }

    pub fn empty() -> Self {
        Self { snapshot: None }
    }
}

impl SnapshotReader for StaticSnapshotReader {
    fn read(&self) -> Option<StateSnapshot> {
        self.snapshot.clone()
    }
}
