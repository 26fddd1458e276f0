use tracing::info;

use crate::{error::Result, progress::ProgressTracker, unit::SyncUnit};

/// Units that are versioned and installed as one logical module
///
/// Most modules have a single unit; a runtime shipping several flavors
/// has one unit per flavor.
pub struct ModuleAggregate {
    name: String,
    units: Vec<SyncUnit>,
    self_update: bool,
}

impl ModuleAggregate {
    pub fn new(name: impl Into<String>, units: Vec<SyncUnit>) -> Self {
        Self {
            name: name.into(),
            units,
            self_update: false,
        }
    }

    /// Mark this module as the host process itself
    ///
    /// Self-update modules are skipped by automatic update checks and only
    /// installed explicitly.
    pub fn self_update(mut self) -> Self {
        self.self_update = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_self_update(&self) -> bool {
        self.self_update
    }

    pub fn units(&self) -> &[SyncUnit] {
        &self.units
    }

    pub async fn is_any_outdated(&self) -> Result<bool> {
        for unit in &self.units {
            if unit.is_outdated().await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Units whose installed marker differs from the remote one
    pub async fn outdated_units(&self) -> Result<Vec<&SyncUnit>> {
        let mut outdated = Vec::new();
        for unit in &self.units {
            if unit.is_outdated().await? {
                outdated.push(unit);
            }
        }
        Ok(outdated)
    }

    /// Install only the outdated units; returns how many were installed
    pub async fn check_updates(&self, progress: &mut ProgressTracker) -> Result<usize> {
        let outdated = self.outdated_units().await?;
        for unit in &outdated {
            unit.install(progress).await?;
        }

        if outdated.is_empty() {
            info!(module = %self.name, "Module is up to date");
        }
        Ok(outdated.len())
    }

    /// Install every unit regardless of its version
    pub async fn install_all(&self, progress: &mut ProgressTracker) -> Result<()> {
        for unit in &self.units {
            unit.install(progress).await?;
        }
        Ok(())
    }

    pub async fn invalidate(&self) {
        for unit in &self.units {
            unit.invalidate().await;
        }
    }
}
