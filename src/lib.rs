pub mod aggregate;
pub mod config;
pub mod error;
pub mod github;
pub mod libraries;
pub mod orchestrator;
pub mod progress;
pub mod source;
pub mod types;
pub mod unit;
pub mod version;

pub use aggregate::ModuleAggregate;
pub use config::InstallerConfig;
pub use error::{ErrorKind, Result, SyncError};
pub use github::GitHubService;
pub use libraries::{LibraryCatalog, LibraryRecord, LibrarySource, LibrarySync, LibrarySyncReport};
pub use orchestrator::{InstallOrchestrator, UnitStatus};
pub use progress::{InstallProgress, ProgressTracker};
pub use source::RemoteDirectoryService;
pub use types::{EntryType, RemoteEntry, RepositoryId};
pub use unit::{ModuleDescriptor, SyncUnit};
pub use version::{VersionStore, DEFAULT_VERSION};
