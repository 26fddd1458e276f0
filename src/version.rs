use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::warn;

use crate::error::{Result, SyncError};

/// Marker reported for a module that was never installed
pub const DEFAULT_VERSION: &str = "0";

/// Persists the version marker of one module in a plain text file
///
/// A missing file reads as [`DEFAULT_VERSION`]. Writes are not atomic: a
/// truncated marker only ever causes a redundant re-sync.
#[derive(Debug, Clone)]
pub struct VersionStore {
    path: PathBuf,
    module: String,
}

impl VersionStore {
    pub fn new(path: impl Into<PathBuf>, module: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            module: module.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted marker; never fails
    pub async fn get(&self) -> String {
        match fs::read_to_string(&self.path).await {
            Ok(version) => version.trim_end().to_string(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(module = %self.module, "Version file not found");
                DEFAULT_VERSION.to_string()
            }
            Err(e) => {
                warn!(
                    module = %self.module,
                    path = %self.path.display(),
                    error = %e,
                    "Unreadable version file, treating module as not installed"
                );
                DEFAULT_VERSION.to_string()
            }
        }
    }

    /// Overwrite the persisted marker
    pub async fn set(&self, version: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::local_io(parent, e))?;
        }

        fs::write(&self.path, version)
            .await
            .map_err(|e| SyncError::local_io(&self.path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_reads_default() {
        let temp_dir = TempDir::new().unwrap();
        let store = VersionStore::new(temp_dir.path().join("version"), "Service");

        let version = tokio_test::block_on(store.get());
        assert_eq!(version, DEFAULT_VERSION);
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let temp_dir = TempDir::new().unwrap();
        let store = VersionStore::new(temp_dir.path().join("nested/dir/version"), "Service");

        store.set("M1").await.unwrap();
        assert_eq!(store.get().await, "M1");

        store.set("M2").await.unwrap();
        assert_eq!(store.get().await, "M2");
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "M2");
    }

    #[tokio::test]
    async fn test_trailing_newline_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("version");
        std::fs::write(&path, "abc123\n").unwrap();

        let store = VersionStore::new(path, "Service");
        assert_eq!(store.get().await, "abc123");
    }
}
