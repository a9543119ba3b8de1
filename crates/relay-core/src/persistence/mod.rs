//! Lifecycle snapshot file and the sidecar task that keeps it current.
//!
//! The file is a single JSON document:
//!
//! ```json
//! { "version": 1, "savedAt": 1700000000, "lifecycle": { "blocks": [], "pending": [], "confirmed": [] } }
//! ```
//!
//! Writes go to a temporary sibling first and are renamed into place, so a crash mid-write
//! leaves the previous snapshot intact. A snapshot older than the configured maximum age, or one
//! that cannot be parsed, is discarded at startup.

pub mod sidecar;

use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{info, warn};

use crate::chain::LifecycleSnapshot;

pub use sidecar::PersistenceSidecar;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotFile {
    pub version: u32,
    /// Unix seconds.
    pub saved_at: u64,
    pub lifecycle: LifecycleSnapshot,
}

impl SnapshotFile {
    #[must_use]
    pub fn age_seconds(&self, now: u64) -> u64 {
        now.saturating_sub(self.saved_at)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),

    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),

    #[error("snapshot is {age_seconds}s old, limit is {max_age_seconds}s")]
    Expired { age_seconds: u64, max_age_seconds: u64 },
}

/// Reads and writes the snapshot file at one path.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
    max_age: Duration,
}

impl SnapshotStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self { path: path.into(), max_age }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Atomically replaces the snapshot file. Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Io`] if the directory, temporary file or rename fails.
    pub async fn save(&self, lifecycle: LifecycleSnapshot, now: u64) -> Result<usize, SnapshotError> {
        let file = SnapshotFile { version: SNAPSHOT_VERSION, saved_at: now, lifecycle };
        let data = serde_json::to_vec(&file)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let temp = self.temp_path();
        tokio::fs::write(&temp, &data).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        Ok(data.len())
    }

    /// Reads the file without any age check.
    ///
    /// # Errors
    ///
    /// Returns an error when the file is missing, unparsable or of an unknown version.
    pub async fn read(&self) -> Result<SnapshotFile, SnapshotError> {
        let data = tokio::fs::read(&self.path).await?;
        let file: SnapshotFile = serde_json::from_slice(&data)?;
        if file.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(file.version));
        }
        Ok(file)
    }

    /// Reads the file and rejects it when older than the maximum age at `now`.
    ///
    /// # Errors
    ///
    /// See [`read`](Self::read); additionally [`SnapshotError::Expired`].
    pub async fn read_fresh(&self, now: u64) -> Result<SnapshotFile, SnapshotError> {
        let file = self.read().await?;
        let age_seconds = file.age_seconds(now);
        let max_age_seconds = self.max_age.as_secs();
        if age_seconds > max_age_seconds {
            return Err(SnapshotError::Expired { age_seconds, max_age_seconds });
        }
        Ok(file)
    }

    /// Startup load. Every failure is logged and yields `None`.
    pub async fn load(&self, now: u64) -> Option<LifecycleSnapshot> {
        match self.read_fresh(now).await {
            Ok(file) => {
                info!(
                    path = %self.path.display(),
                    age_seconds = file.age_seconds(now),
                    blocks = file.lifecycle.blocks.len(),
                    pending = file.lifecycle.pending.len(),
                    "snapshot loaded"
                );
                Some(file.lifecycle)
            }
            Err(SnapshotError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no snapshot found, starting empty");
                None
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "snapshot discarded");
                None
            }
        }
    }
}
