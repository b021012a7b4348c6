//! Schema reset and ownership fix-up around a restore.

use crate::components::{Database, Maintenance};
use crate::config::Config;
use crate::fs::permissions::{chown_recursive, Ownership};
use crate::utils::Result;
use std::path::PathBuf;
use tracing::info;

pub struct SystemMaintenance {
    database: Database,
    user: String,
    group: String,
    restored_paths: Vec<PathBuf>,
}

impl SystemMaintenance {
    pub fn from_config(config: &Config) -> Self {
        let mut restored_paths: Vec<PathBuf> = config.repositories.storages.values().cloned().collect();
        restored_paths.extend([
            config.paths.uploads.clone(),
            config.paths.builds.clone(),
            config.paths.artifacts.clone(),
            config.paths.lfs.clone(),
        ]);
        if config.registry.enabled {
            restored_paths.push(config.registry.path.clone());
        }

        Self {
            database: Database::new(config.database.clone()),
            user: config.gitlab.user.clone(),
            group: config.gitlab.group.clone(),
            restored_paths,
        }
    }
}

impl Maintenance for SystemMaintenance {
    fn drop_tables(&self) -> Result<()> {
        self.database.drop_tables()
    }

    fn fix_permissions(&self) -> Result<()> {
        let owner = Ownership::lookup(&self.user, &self.group)?;
        for path in &self.restored_paths {
            let changed = chown_recursive(path, owner)?;
            info!(
                "Ownership {}:{} applied to {} ({} entries)",
                self.user,
                self.group,
                path.display(),
                changed
            );
        }
        Ok(())
    }
}
