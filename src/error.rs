use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while synchronizing modules
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Remote content not found: {path}")]
    NotFound { path: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Rate limited by remote service: {message}")]
    RateLimited { message: String },

    #[error("Invalid remote response: {message}")]
    InvalidResponse { message: String },

    #[error(
        "Module {module} has no `{marker}` entry in its remote listing; \
         the remote tree may be partially published"
    )]
    MissingVersionMarker { module: String, marker: String },

    #[error("IO error at {}: {source}", .path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

/// Coarse classification of a [`SyncError`]
///
/// Callers use this to decide between surfacing an alert and retrying later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The remote listing or blob call failed
    RemoteFetch,
    /// A module's remote tree lacks its version marker entry
    MissingVersionMarker,
    /// A local filesystem operation failed
    LocalIo,
    /// Configuration or persisted state could not be parsed
    Configuration,
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::NotFound { .. }
            | SyncError::Network(_)
            | SyncError::RateLimited { .. }
            | SyncError::InvalidResponse { .. } => ErrorKind::RemoteFetch,
            SyncError::MissingVersionMarker { .. } => ErrorKind::MissingVersionMarker,
            SyncError::LocalIo { .. } => ErrorKind::LocalIo,
            SyncError::InvalidConfig { .. }
            | SyncError::Serialization(_)
            | SyncError::ConfigParse(_) => ErrorKind::Configuration,
        }
    }

    /// Build a `LocalIo` error for the given path
    pub(crate) fn local_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::LocalIo {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for synchronization operations
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let missing = SyncError::MissingVersionMarker {
            module: "Bootstrapper/net8".to_string(),
            marker: "manifest.json".to_string(),
        };
        assert_eq!(missing.kind(), ErrorKind::MissingVersionMarker);

        let not_found = SyncError::NotFound {
            path: "Binaries".to_string(),
        };
        assert_eq!(not_found.kind(), ErrorKind::RemoteFetch);

        let io = SyncError::local_io(
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(io.kind(), ErrorKind::LocalIo);
        assert!(io.to_string().contains("/tmp/x"));
    }
}
