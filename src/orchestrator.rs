use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tracing::{info, warn};

use crate::{
    aggregate::ModuleAggregate,
    config::InstallerConfig,
    error::{Result, SyncError},
    libraries::LibrarySync,
    progress::ProgressTracker,
    source::RemoteDirectoryService,
    unit::SyncUnit,
};

/// Version state of one unit, as reported by [`InstallOrchestrator::status`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitStatus {
    pub module: String,
    pub unit: String,
    pub installed_version: String,
    pub remote_version: String,
    pub outdated: bool,
}

/// Owns every module of an installation and drives update runs
///
/// Units are installed strictly one after another. The first error stops
/// the run; units installed before it stay committed.
pub struct InstallOrchestrator {
    root_directory: PathBuf,
    aggregates: Vec<ModuleAggregate>,
    libraries: Option<LibrarySync>,
}

impl InstallOrchestrator {
    pub fn new(root_directory: impl Into<PathBuf>, aggregates: Vec<ModuleAggregate>) -> Self {
        Self {
            root_directory: root_directory.into(),
            aggregates,
            libraries: None,
        }
    }

    pub fn with_libraries(mut self, libraries: LibrarySync) -> Self {
        self.libraries = Some(libraries);
        self
    }

    /// Build the orchestrator described by `config`, reading from `service`
    pub fn from_config(config: &InstallerConfig, service: Arc<dyn RemoteDirectoryService>) -> Self {
        let repository = config.repository.id();

        let aggregates = config
            .modules
            .iter()
            .map(|module| {
                let units = module
                    .units
                    .iter()
                    .map(|d| SyncUnit::new(d.clone(), repository.clone(), service.clone()))
                    .collect();
                let aggregate = ModuleAggregate::new(&module.name, units);
                if module.self_update {
                    aggregate.self_update()
                } else {
                    aggregate
                }
            })
            .collect();

        let orchestrator = Self::new(&config.root_directory, aggregates);
        match &config.libraries {
            Some(libraries) => orchestrator.with_libraries(
                LibrarySync::new(
                    repository,
                    service,
                    libraries.sources.clone(),
                    &libraries.catalog_file,
                )
                .with_excluded_entries(libraries.excluded_entries.iter().cloned()),
            ),
            None => orchestrator,
        }
    }

    pub fn root_directory(&self) -> &Path {
        &self.root_directory
    }

    pub fn aggregates(&self) -> &[ModuleAggregate] {
        &self.aggregates
    }

    /// Every directory the installation consists of, root first
    pub fn directories(&self) -> Vec<PathBuf> {
        let mut directories = vec![self.root_directory.clone()];
        let units = self.aggregates.iter().flat_map(|a| a.units());
        directories.extend(units.map(|u| u.local_directory().to_path_buf()));
        if let Some(libraries) = &self.libraries {
            directories.extend(libraries.sources().iter().map(|s| s.local_directory.clone()));
        }
        directories
    }

    /// Whether every configured directory exists; says nothing about versions
    pub async fn is_fully_provisioned(&self) -> bool {
        for directory in self.directories() {
            if !fs::try_exists(&directory).await.unwrap_or(false) {
                return false;
            }
        }
        true
    }

    pub async fn create_directories(&self) -> Result<()> {
        for directory in self.directories() {
            fs::create_dir_all(&directory)
                .await
                .map_err(|e| SyncError::local_io(&directory, e))?;
        }
        Ok(())
    }

    /// Recursively delete the installation root. Irreversible.
    pub async fn delete_all_directories(&self) -> Result<()> {
        warn!(root = %self.root_directory.display(), "Deleting installation");
        match fs::remove_dir_all(&self.root_directory).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::local_io(&self.root_directory, e)),
        }
    }

    /// Drop every cached listing
    pub async fn invalidate(&self) {
        for aggregate in &self.aggregates {
            aggregate.invalidate().await;
        }
    }

    /// Install outdated units, leaving the self-update module alone
    ///
    /// Returns the number of units installed.
    pub async fn check_updates(&self, progress: &mut ProgressTracker) -> Result<usize> {
        self.install_outdated(progress, false).await
    }

    /// Rescan the remote and install every outdated unit, self-update included
    ///
    /// Returns the number of units installed.
    pub async fn install(&self, progress: &mut ProgressTracker) -> Result<usize> {
        self.invalidate().await;
        self.install_outdated(progress, true).await
    }

    /// Install every unit of every module regardless of version
    pub async fn reinstall_all(&self, progress: &mut ProgressTracker) -> Result<usize> {
        let units: usize = self.aggregates.iter().map(|a| a.units().len()).sum();
        progress.setup(units + usize::from(self.libraries.is_some()));

        for aggregate in &self.aggregates {
            aggregate.install_all(progress).await?;
        }
        if let Some(libraries) = &self.libraries {
            libraries.sync(progress).await?;
        }
        Ok(units)
    }

    pub async fn status(&self) -> Result<Vec<UnitStatus>> {
        let mut report = Vec::new();
        for aggregate in &self.aggregates {
            for unit in aggregate.units() {
                let installed_version = unit.installed_version().await;
                let remote_version = unit.current_version_fingerprint().await?;
                report.push(UnitStatus {
                    module: aggregate.name().to_string(),
                    unit: unit.name().to_string(),
                    outdated: installed_version != remote_version,
                    installed_version,
                    remote_version,
                });
            }
        }
        Ok(report)
    }

    async fn install_outdated(
        &self,
        progress: &mut ProgressTracker,
        include_self_update: bool,
    ) -> Result<usize> {
        let mut outdated = Vec::new();
        for aggregate in &self.aggregates {
            if aggregate.is_self_update() && !include_self_update {
                continue;
            }
            outdated.extend(aggregate.outdated_units().await?);
        }

        progress.setup(outdated.len() + usize::from(self.libraries.is_some()));
        info!(outdated = outdated.len(), "Starting update run");

        for unit in &outdated {
            unit.install(progress).await?;
        }
        if let Some(libraries) = &self.libraries {
            libraries.sync(progress).await?;
        }

        info!(installed = outdated.len(), "Update run finished");
        Ok(outdated.len())
    }
}
