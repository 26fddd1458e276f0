//! Per-file incremental synchronization of shared libraries.
//!
//! Unlike regular modules, libraries are tracked individually in a
//! [`LibraryCatalog`]: a library whose remote content hash matches its
//! catalog record is left alone, and user-set override paths survive
//! re-synchronization.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info};

use crate::{
    error::{Result, SyncError},
    progress::ProgressTracker,
    source::RemoteDirectoryService,
    types::{EntryType, RemoteEntry, RepositoryId},
    unit::strip_remote_prefix,
};

/// Progress part name used for library synchronization
pub const LIBRARIES_PART: &str = "Libraries";

/// Placeholder file keeping otherwise empty remote directories alive
pub const PLACEHOLDER_ENTRY: &str = "plug";

const LIBRARY_EXTENSION: &str = "dll";

/// One installed library
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryRecord {
    pub name: String,
    pub content_hash: String,
    pub target_runtime: String,
    /// Locally built replacement chosen by the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_override_path: Option<PathBuf>,
}

/// Persisted list of installed libraries, unique per `(name, target_runtime)`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryCatalog {
    #[serde(default)]
    pub libraries: Vec<LibraryRecord>,
}

impl LibraryCatalog {
    /// Load the catalog; a missing file is an empty catalog
    pub async fn load(path: &Path) -> Result<Self> {
        match fs::read(path).await {
            Ok(data) => Ok(serde_json::from_slice(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(SyncError::local_io(path, e)),
        }
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::local_io(parent, e))?;
        }

        let data = serde_json::to_vec_pretty(self)?;
        fs::write(path, data)
            .await
            .map_err(|e| SyncError::local_io(path, e))
    }

    pub fn find(&self, name: &str, target_runtime: &str) -> Option<&LibraryRecord> {
        self.libraries
            .iter()
            .find(|l| l.name == name && l.target_runtime == target_runtime)
    }

    /// Insert `record`, replacing any record with the same key
    pub fn upsert(&mut self, record: LibraryRecord) {
        match self
            .libraries
            .iter_mut()
            .find(|l| l.name == record.name && l.target_runtime == record.target_runtime)
        {
            Some(existing) => *existing = record,
            None => self.libraries.push(record),
        }
    }

    /// Point a library at a locally built file
    pub fn set_local_override(
        &mut self,
        name: &str,
        target_runtime: &str,
        path: Option<PathBuf>,
    ) -> bool {
        match self
            .libraries
            .iter_mut()
            .find(|l| l.name == name && l.target_runtime == target_runtime)
        {
            Some(record) => {
                record.local_override_path = path;
                true
            }
            None => false,
        }
    }
}

/// A remote directory of libraries built for one runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibrarySource {
    pub remote_path: String,
    pub local_directory: PathBuf,
    pub target_runtime: String,
}

/// Outcome of a library synchronization
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibrarySyncReport {
    /// Files written to disk
    pub downloaded: usize,
    /// Libraries whose catalog record already matched the remote hash
    pub unchanged: usize,
}

/// Synchronizes library sources against a [`LibraryCatalog`]
pub struct LibrarySync {
    repository: RepositoryId,
    service: Arc<dyn RemoteDirectoryService>,
    sources: Vec<LibrarySource>,
    catalog_file: PathBuf,
    excluded_entries: Vec<String>,
}

impl LibrarySync {
    pub fn new(
        repository: RepositoryId,
        service: Arc<dyn RemoteDirectoryService>,
        sources: Vec<LibrarySource>,
        catalog_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            repository,
            service,
            sources,
            catalog_file: catalog_file.into(),
            excluded_entries: vec![PLACEHOLDER_ENTRY.to_string()],
        }
    }

    /// Replace the entry names skipped during synchronization
    pub fn with_excluded_entries<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_entries = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn catalog_file(&self) -> &Path {
        &self.catalog_file
    }

    pub fn sources(&self) -> &[LibrarySource] {
        &self.sources
    }

    pub async fn catalog(&self) -> Result<LibraryCatalog> {
        LibraryCatalog::load(&self.catalog_file).await
    }

    /// Download every library whose hash changed and save the catalog
    ///
    /// Records without a remote counterpart are kept as they are. The catalog
    /// is only written once every source has been synchronized.
    pub async fn sync(&self, progress: &mut ProgressTracker) -> Result<LibrarySyncReport> {
        let previous = self.catalog().await?;
        let mut catalog = previous.clone();

        let mut listings = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            let entries = self
                .service
                .list_entries(&self.repository, &source.remote_path)
                .await?;
            listings.push(entries);
        }

        let mut pending_bytes = 0;
        for (source, entries) in self.sources.iter().zip(&listings) {
            pending_bytes += entries
                .iter()
                .filter(|e| self.needs_download(&previous, source, e))
                .map(|e| e.size)
                .sum::<u64>();
        }
        progress.begin_part(LIBRARIES_PART, pending_bytes);

        let mut report = LibrarySyncReport::default();
        for (source, entries) in self.sources.iter().zip(&listings) {
            for entry in entries {
                if self.is_excluded(entry) {
                    continue;
                }

                let path = local_path(source, entry)?;
                if entry.entry_type == EntryType::Dir {
                    fs::create_dir_all(&path)
                        .await
                        .map_err(|e| SyncError::local_io(&path, e))?;
                    continue;
                }

                if !self.needs_download(&previous, source, entry) {
                    report.unchanged += 1;
                    continue;
                }

                if let Some(name) = library_name(&entry.name) {
                    let local_override_path = previous
                        .find(name, &source.target_runtime)
                        .and_then(|old| old.local_override_path.clone());
                    catalog.upsert(LibraryRecord {
                        name: name.to_string(),
                        content_hash: entry.content_hash.clone(),
                        target_runtime: source.target_runtime.clone(),
                        local_override_path,
                    });
                }

                let bytes = self.service.fetch_bytes(&self.repository, entry).await?;
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)
                        .await
                        .map_err(|e| SyncError::local_io(parent, e))?;
                }
                fs::write(&path, &bytes)
                    .await
                    .map_err(|e| SyncError::local_io(&path, e))?;

                debug!(path = %path.display(), runtime = %source.target_runtime, "Wrote library file");
                progress.add_downloaded_bytes(bytes.len() as u64);
                report.downloaded += 1;
            }
        }

        catalog.save(&self.catalog_file).await?;
        info!(
            downloaded = report.downloaded,
            unchanged = report.unchanged,
            "Libraries synchronized"
        );
        Ok(report)
    }

    fn is_excluded(&self, entry: &RemoteEntry) -> bool {
        self.excluded_entries.iter().any(|name| *name == entry.name)
    }

    fn needs_download(
        &self,
        previous: &LibraryCatalog,
        source: &LibrarySource,
        entry: &RemoteEntry,
    ) -> bool {
        if !entry.is_file() || self.is_excluded(entry) {
            return false;
        }

        let stem = file_stem(&entry.name);
        !matches!(
            previous.find(stem, &source.target_runtime),
            Some(record) if record.content_hash == entry.content_hash
        )
    }
}

fn file_stem(file_name: &str) -> &str {
    Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name)
}

/// Catalog name of a library file, `None` for non-library files
fn library_name(file_name: &str) -> Option<&str> {
    let extension = Path::new(file_name).extension()?.to_str()?;
    extension
        .eq_ignore_ascii_case(LIBRARY_EXTENSION)
        .then(|| file_stem(file_name))
}

fn local_path(source: &LibrarySource, entry: &RemoteEntry) -> Result<PathBuf> {
    strip_remote_prefix(&source.remote_path, &entry.path)
        .filter(|relative| !relative.split('/').any(|part| part == ".." || part == "."))
        .map(|relative| source.local_directory.join(relative))
        .ok_or_else(|| SyncError::InvalidResponse {
            message: format!(
                "Entry {} is outside of {}",
                entry.path, source.remote_path
            ),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, runtime: &str, hash: &str) -> LibraryRecord {
        LibraryRecord {
            name: name.to_string(),
            content_hash: hash.to_string(),
            target_runtime: runtime.to_string(),
            local_override_path: None,
        }
    }

    #[test]
    fn test_upsert_keeps_one_record_per_key() {
        let mut catalog = LibraryCatalog::default();
        catalog.upsert(record("Core", "net8", "a"));
        catalog.upsert(record("Core", "net472", "b"));
        catalog.upsert(record("Core", "net8", "c"));

        assert_eq!(catalog.libraries.len(), 2);
        assert_eq!(catalog.find("Core", "net8").unwrap().content_hash, "c");
        assert_eq!(catalog.find("Core", "net472").unwrap().content_hash, "b");
    }

    #[test]
    fn test_set_local_override() {
        let mut catalog = LibraryCatalog::default();
        catalog.upsert(record("Core", "net8", "a"));

        assert!(catalog.set_local_override("Core", "net8", Some(PathBuf::from("/dev/Core.dll"))));
        assert!(!catalog.set_local_override("Missing", "net8", None));
        assert_eq!(
            catalog.find("Core", "net8").unwrap().local_override_path,
            Some(PathBuf::from("/dev/Core.dll"))
        );
    }

    #[test]
    fn test_library_name() {
        assert_eq!(library_name("Korn.Core.dll"), Some("Korn.Core"));
        assert_eq!(library_name("Native.DLL"), Some("Native"));
        assert_eq!(library_name("Korn.Core.pdb"), None);
        assert_eq!(library_name("README"), None);
    }

    #[tokio::test]
    async fn test_catalog_missing_file_is_empty() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let catalog = LibraryCatalog::load(&temp_dir.path().join("libraries.json"))
            .await
            .unwrap();
        assert!(catalog.libraries.is_empty());
    }
}
