//! File-tree components: uploads, builds, artifacts, LFS objects, registry.
//!
//! Each tree is packed into `<name>.tar.gz` through the archiver. On restore
//! the live directory is moved aside to `<dir>.<timestamp>` before the
//! artifact is unpacked in its place.

use super::ComponentTask;
use crate::archive::Archiver;
use crate::component::Component;
use crate::executor::manifest::Manifest;
use crate::fs::permissions::{create_private_dir, remove_entry};
use crate::utils::{BackupError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub struct FilesComponent {
    component: Component,
    app_files_dir: PathBuf,
    archiver: Arc<dyn Archiver>,
}

impl FilesComponent {
    pub fn new(component: Component, app_files_dir: &Path, archiver: Arc<dyn Archiver>) -> Self {
        Self {
            component,
            app_files_dir: app_files_dir.to_path_buf(),
            archiver,
        }
    }

    /// Move the live directory out of the way; returns where it went.
    fn move_existing_aside(&self) -> Result<Option<PathBuf>> {
        if !self.app_files_dir.exists() {
            return Ok(None);
        }

        let timestamp = chrono::Utc::now().timestamp();
        let mut aside = PathBuf::from(format!("{}.{}", self.app_files_dir.display(), timestamp));
        let mut n = 1;
        while aside.exists() {
            aside = PathBuf::from(format!("{}.{}-{}", self.app_files_dir.display(), timestamp, n));
            n += 1;
        }

        std::fs::rename(&self.app_files_dir, &aside)?;
        info!(
            "Moved existing {} to {}",
            self.app_files_dir.display(),
            aside.display()
        );
        Ok(Some(aside))
    }
}

impl ComponentTask for FilesComponent {
    fn component(&self) -> Component {
        self.component
    }

    fn dump(&self, staging_dir: &Path, _manifest: &mut Manifest) -> Result<()> {
        let dest = staging_dir.join(self.component.artifact_name());

        if self.app_files_dir.is_dir() {
            return self.archiver.pack(&self.app_files_dir, &dest);
        }

        // Keep the archive layout stable when the tree has never been created
        warn!(
            "{} directory {} does not exist, writing an empty archive",
            self.component,
            self.app_files_dir.display()
        );
        let empty = staging_dir.join(format!("tmp_empty_{}", self.component.name()));
        create_private_dir(&empty)?;
        let packed = self.archiver.pack(&empty, &dest);
        remove_entry(&empty)?;
        packed
    }

    fn restore(&self, staging_dir: &Path, _manifest: &Manifest) -> Result<()> {
        let artifact = staging_dir.join(self.component.artifact_name());
        if !artifact.is_file() {
            return Err(BackupError::Archive(format!(
                "{} missing from backup",
                self.component.artifact_name()
            )));
        }

        self.move_existing_aside()?;
        self.archiver.unpack(&artifact, &self.app_files_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::TarGzArchiver;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_dump_and_restore_moves_existing_aside() -> Result<()> {
        let root = TempDir::new()?;
        let uploads = root.path().join("uploads");
        fs::create_dir_all(uploads.join("user/avatar/1"))?;
        fs::write(uploads.join("user/avatar/1/me.png"), b"png")?;

        let staging = root.path().join("staging");
        fs::create_dir(&staging)?;

        let task = FilesComponent::new(Component::Uploads, &uploads, Arc::new(TarGzArchiver));
        let mut manifest = Manifest::new("8.17.0", "tar");
        task.dump(&staging, &mut manifest)?;
        assert!(staging.join("uploads.tar.gz").is_file());

        fs::write(uploads.join("user/avatar/1/me.png"), b"changed")?;
        task.restore(&staging, &manifest)?;

        assert_eq!(fs::read(uploads.join("user/avatar/1/me.png"))?, b"png");
        let aside: Vec<_> = fs::read_dir(root.path())?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("uploads."))
            .collect();
        assert_eq!(aside.len(), 1);
        assert_eq!(fs::read(aside[0].path().join("user/avatar/1/me.png"))?, b"changed");
        Ok(())
    }

    #[test]
    fn test_missing_tree_dumps_empty_archive() -> Result<()> {
        let root = TempDir::new()?;
        let task = FilesComponent::new(
            Component::Registry,
            &root.path().join("registry"),
            Arc::new(TarGzArchiver),
        );
        let mut manifest = Manifest::new("8.17.0", "tar");
        task.dump(root.path(), &mut manifest)?;

        assert!(root.path().join("registry.tar.gz").is_file());
        assert!(!root.path().join("tmp_empty_registry").exists());
        assert!(!root.path().join("registry").exists());
        Ok(())
    }

    #[test]
    fn test_restore_without_artifact_fails() {
        let root = TempDir::new().unwrap();
        let task = FilesComponent::new(Component::Lfs, root.path(), Arc::new(TarGzArchiver));
        let manifest = Manifest::new("8.17.0", "tar");
        assert!(matches!(
            task.restore(root.path(), &manifest),
            Err(BackupError::Archive(_))
        ));
    }
}
