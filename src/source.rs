use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    error::Result,
    types::{RemoteEntry, RepositoryId},
};

/// Remote listing/blob service that modules are synchronized from
///
/// Implementors provide read-only access to a hosted repository
/// (GitHub, a test double, a mirror...). Transport concerns such as
/// authentication, retries and timeouts belong to the implementor.
#[async_trait]
pub trait RemoteDirectoryService: Send + Sync {
    /// List every entry under `path`, recursively
    ///
    /// Directories must appear before their descendants.
    /// Returns `SyncError::NotFound` if the path doesn't exist
    async fn list_entries(&self, repository: &RepositoryId, path: &str) -> Result<Vec<RemoteEntry>>;

    /// Fetch the raw bytes of a file entry
    async fn fetch_bytes(&self, repository: &RepositoryId, entry: &RemoteEntry) -> Result<Bytes>;

    /// Get a human-readable identifier for this service (for logging/debugging)
    fn identifier(&self) -> String;
}
