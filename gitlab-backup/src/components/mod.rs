//! Component collaborators.
//!
//! Each [`ComponentTask`] knows how to dump one subsystem into the staging
//! directory and how to restore it from there. The coordinator only decides
//! which tasks run and in what order.

pub mod database;
pub mod files;
pub mod repositories;

use crate::archive::Archiver;
use crate::component::Component;
use crate::config::Config;
use crate::executor::manifest::Manifest;
use crate::utils::Result;
use std::path::Path;
use std::sync::Arc;

pub use database::Database;
pub use files::FilesComponent;
pub use repositories::Repositories;

pub trait ComponentTask: Send + Sync {
    fn component(&self) -> Component;

    /// Write this component's artifact to `staging_dir/<artifact_name>`.
    fn dump(&self, staging_dir: &Path, manifest: &mut Manifest) -> Result<()>;

    /// Restore from the artifact previously unpacked into `staging_dir`.
    fn restore(&self, staging_dir: &Path, manifest: &Manifest) -> Result<()>;
}

/// Steps around the component restores that are not components themselves.
pub trait Maintenance: Send + Sync {
    /// Drop every table of the application schema.
    fn drop_tables(&self) -> Result<()>;

    /// Re-apply expected ownership on restored trees.
    fn fix_permissions(&self) -> Result<()>;
}

/// The production task for every component, in backup order.
pub fn default_tasks(config: &Config, archiver: Arc<dyn Archiver>) -> Vec<Box<dyn ComponentTask>> {
    let file_tree = |component, dir: &Path| -> Box<dyn ComponentTask> {
        Box::new(FilesComponent::new(component, dir, archiver.clone()))
    };

    vec![
        Box::new(Database::new(config.database.clone())),
        Box::new(Repositories::new(
            config.repositories.storages.clone(),
            config.git.bin_path.clone(),
        )),
        file_tree(Component::Uploads, &config.paths.uploads),
        file_tree(Component::Builds, &config.paths.builds),
        file_tree(Component::Artifacts, &config.paths.artifacts),
        file_tree(Component::Lfs, &config.paths.lfs),
        file_tree(Component::Registry, &config.registry.path),
    ]
}
