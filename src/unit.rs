//! Synchronization of a single local directory against a remote one.
//!
//! A [`SyncUnit`] compares the content hash of a designated marker entry in
//! the remote listing with the locally persisted version marker. When they
//! differ, the whole remote tree is downloaded again and the marker is only
//! persisted once every entry has been written.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{
    error::{Result, SyncError},
    progress::ProgressTracker,
    source::RemoteDirectoryService,
    types::{EntryType, RemoteEntry, RepositoryId},
    version::VersionStore,
};

/// Static configuration of one synchronized directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// Display name, also used as the progress part name
    pub name: String,
    /// Directory inside the remote repository
    pub remote_path: String,
    /// Local directory the remote tree is materialized into
    pub local_directory: PathBuf,
    /// Text file holding the installed version marker
    pub version_file: PathBuf,
    /// Name of the remote file whose content hash versions the module
    pub version_marker: String,
    /// Entry names that are neither downloaded nor counted (e.g. `plug`)
    #[serde(default)]
    pub excluded_entries: Vec<String>,
}

impl ModuleDescriptor {
    pub fn new(
        name: impl Into<String>,
        remote_path: impl Into<String>,
        local_directory: impl Into<PathBuf>,
        version_file: impl Into<PathBuf>,
        version_marker: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            remote_path: remote_path.into(),
            local_directory: local_directory.into(),
            version_file: version_file.into(),
            version_marker: version_marker.into(),
            excluded_entries: Vec::new(),
        }
    }

    pub fn with_excluded_entries<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_entries = names.into_iter().map(Into::into).collect();
        self
    }

    fn is_excluded(&self, entry: &RemoteEntry) -> bool {
        self.excluded_entries.iter().any(|name| *name == entry.name)
    }
}

/// Listing, comparison and materialization for one module directory
pub struct SyncUnit {
    descriptor: ModuleDescriptor,
    repository: RepositoryId,
    service: Arc<dyn RemoteDirectoryService>,
    version_store: VersionStore,
    entries: RwLock<Option<Arc<Vec<RemoteEntry>>>>,
}

impl SyncUnit {
    pub fn new(
        descriptor: ModuleDescriptor,
        repository: RepositoryId,
        service: Arc<dyn RemoteDirectoryService>,
    ) -> Self {
        let version_store = VersionStore::new(&descriptor.version_file, &descriptor.name);
        Self {
            descriptor,
            repository,
            service,
            version_store,
            entries: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    pub fn local_directory(&self) -> &Path {
        &self.descriptor.local_directory
    }

    pub fn version_store(&self) -> &VersionStore {
        &self.version_store
    }

    /// Remote entries under the module's remote path
    ///
    /// Fetched once and cached until [`SyncUnit::invalidate`] is called.
    pub async fn list_entries(&self) -> Result<Arc<Vec<RemoteEntry>>> {
        if let Some(entries) = self.entries.read().await.as_ref() {
            return Ok(entries.clone());
        }

        let mut cached = self.entries.write().await;
        if let Some(entries) = cached.as_ref() {
            return Ok(entries.clone());
        }

        let entries: Vec<RemoteEntry> = self
            .service
            .list_entries(&self.repository, &self.descriptor.remote_path)
            .await?
            .into_iter()
            .filter(|entry| !self.descriptor.is_excluded(entry))
            .collect();
        debug!(
            module = %self.descriptor.name,
            entries = entries.len(),
            "Fetched remote listing"
        );

        let entries = Arc::new(entries);
        *cached = Some(entries.clone());
        Ok(entries)
    }

    /// Drop the cached listing so the next access sees current remote state
    pub async fn invalidate(&self) {
        *self.entries.write().await = None;
    }

    /// Content hash of the module's marker entry
    pub async fn current_version_fingerprint(&self) -> Result<String> {
        let entries = self.list_entries().await?;
        self.fingerprint_of(&entries)
    }

    pub async fn installed_version(&self) -> String {
        self.version_store.get().await
    }

    pub async fn is_outdated(&self) -> Result<bool> {
        let remote = self.current_version_fingerprint().await?;
        Ok(self.version_store.get().await != remote)
    }

    /// Sum of all file sizes in the listing
    pub async fn total_bytes(&self) -> Result<u64> {
        let entries = self.list_entries().await?;
        Ok(Self::sum_file_sizes(&entries))
    }

    /// Re-download every entry and persist the new version marker
    ///
    /// Any failure aborts the install before the marker is written, so the
    /// module stays outdated and the next run downloads everything again.
    /// Callers without a UI pass [`ProgressTracker::new`], which records
    /// progress but notifies no one.
    pub async fn install(&self, progress: &mut ProgressTracker) -> Result<()> {
        let entries = self.list_entries().await?;
        // Validate the marker before touching the filesystem
        let version = self.fingerprint_of(&entries)?;

        progress.begin_part(&self.descriptor.name, Self::sum_file_sizes(&entries));
        info!(
            module = %self.descriptor.name,
            remote = %self.descriptor.remote_path,
            entries = entries.len(),
            "Installing module"
        );

        for entry in entries.iter() {
            let path = self.local_path(entry)?;
            match entry.entry_type {
                EntryType::Dir => {
                    fs::create_dir_all(&path)
                        .await
                        .map_err(|e| SyncError::local_io(&path, e))?;
                }
                EntryType::File => {
                    let bytes = self.service.fetch_bytes(&self.repository, entry).await?;
                    if bytes.len() as u64 != entry.size {
                        warn!(
                            path = %entry.path,
                            expected = entry.size,
                            actual = bytes.len(),
                            "Downloaded size differs from listing"
                        );
                    }

                    if let Some(parent) = path.parent() {
                        fs::create_dir_all(parent)
                            .await
                            .map_err(|e| SyncError::local_io(parent, e))?;
                    }
                    fs::write(&path, &bytes)
                        .await
                        .map_err(|e| SyncError::local_io(&path, e))?;

                    debug!(path = %path.display(), bytes = bytes.len(), "Wrote file");
                    progress.add_downloaded_bytes(bytes.len() as u64);
                }
            }
        }

        self.version_store.set(&version).await?;
        info!(module = %self.descriptor.name, version = %version, "Module installed");
        Ok(())
    }

    fn fingerprint_of(&self, entries: &[RemoteEntry]) -> Result<String> {
        entries
            .iter()
            .find(|e| e.name == self.descriptor.version_marker)
            .map(|e| e.content_hash.clone())
            .ok_or_else(|| SyncError::MissingVersionMarker {
                module: self.descriptor.name.clone(),
                marker: self.descriptor.version_marker.clone(),
            })
    }

    fn sum_file_sizes(entries: &[RemoteEntry]) -> u64 {
        entries.iter().filter(|e| e.is_file()).map(|e| e.size).sum()
    }

    /// Map a remote entry to its location under the local directory
    fn local_path(&self, entry: &RemoteEntry) -> Result<PathBuf> {
        let relative = strip_remote_prefix(&self.descriptor.remote_path, &entry.path).ok_or_else(
            || SyncError::InvalidResponse {
                message: format!(
                    "Entry {} is outside of {}",
                    entry.path, self.descriptor.remote_path
                ),
            },
        )?;

        let relative = Path::new(relative);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(SyncError::InvalidResponse {
                message: format!("Refusing unsafe entry path {}", entry.path),
            });
        }

        Ok(self.descriptor.local_directory.join(relative))
    }
}

/// Strip `remote_path` from a repository-rooted entry path
///
/// Returns `None` when the entry is not strictly below `remote_path`.
pub(crate) fn strip_remote_prefix<'a>(remote_path: &str, entry_path: &'a str) -> Option<&'a str> {
    let base = remote_path.trim_matches('/');
    let path = entry_path.trim_start_matches('/');

    let relative = if base.is_empty() {
        path
    } else {
        path.strip_prefix(base)?.strip_prefix('/')?
    };

    let relative = relative.trim_matches('/');
    (!relative.is_empty()).then_some(relative)
}
