//! Installer configuration file parsing (TOML)

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{
    error::{Result, SyncError},
    libraries::{LibrarySource, PLACEHOLDER_ENTRY},
    types::RepositoryId,
    unit::ModuleDescriptor,
};

/// Installer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct InstallerConfig {
    /// Root of the installation; relative paths below are resolved against it
    pub root_directory: PathBuf,

    pub repository: RepositoryConfig,

    pub modules: Vec<ModuleConfig>,

    #[serde(default)]
    pub libraries: Option<LibrariesConfig>,
}

/// Remote repository holding every module
#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryConfig {
    pub owner: String,
    pub name: String,
    /// Branch or ref to read (default: repository default branch)
    #[serde(default)]
    pub branch: Option<String>,
    /// Environment variable holding an API token
    #[serde(default)]
    pub token_env: Option<String>,
}

impl RepositoryConfig {
    pub fn id(&self) -> RepositoryId {
        RepositoryId::new(&self.owner, &self.name)
    }
}

/// One logical module made of one or more units
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleConfig {
    pub name: String,
    /// The module hosting this installer; never updated automatically
    #[serde(default)]
    pub self_update: bool,
    pub units: Vec<ModuleDescriptor>,
}

/// Library synchronization settings
#[derive(Debug, Clone, Deserialize)]
pub struct LibrariesConfig {
    pub catalog_file: PathBuf,
    pub sources: Vec<LibrarySource>,
    /// Entry names that are never downloaded (default: `["plug"]`)
    #[serde(default = "default_library_exclusions")]
    pub excluded_entries: Vec<String>,
}

fn default_library_exclusions() -> Vec<String> {
    vec![PLACEHOLDER_ENTRY.to_string()]
}

impl InstallerConfig {
    /// Load and validate a config file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| SyncError::local_io(path, e))?;
        Self::from_toml_str(&content)
    }

    /// Parse a config, resolve relative paths and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content)?;
        config.resolve_paths();
        config.validate()?;
        Ok(config)
    }

    fn resolve_paths(&mut self) {
        let root = self.root_directory.clone();
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = root.join(&*path);
            }
        };

        for unit in self.modules.iter_mut().flat_map(|m| m.units.iter_mut()) {
            resolve(&mut unit.local_directory);
            resolve(&mut unit.version_file);
        }

        if let Some(libraries) = &mut self.libraries {
            resolve(&mut libraries.catalog_file);
            for source in &mut libraries.sources {
                resolve(&mut source.local_directory);
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.modules.is_empty() {
            return Err(invalid("at least one module must be configured"));
        }

        let mut unit_names = HashSet::new();
        for module in &self.modules {
            if module.units.is_empty() {
                return Err(invalid(format!("module {} has no units", module.name)));
            }

            for unit in &module.units {
                if !unit_names.insert(unit.name.as_str()) {
                    return Err(invalid(format!("duplicate unit name {}", unit.name)));
                }
                if unit.version_marker.trim().is_empty() {
                    return Err(invalid(format!("unit {} has an empty version marker", unit.name)));
                }
            }
        }

        if self.modules.iter().filter(|m| m.self_update).count() > 1 {
            return Err(invalid("only one module may be marked self_update"));
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> SyncError {
    SyncError::InvalidConfig {
        message: message.into(),
    }
}
