//! Backup manifest.
//!
//! Written as `backup_information.json` at the archive root; read back
//! before a restore to gate on version and to learn what the archive holds.

use crate::component::{Component, SkipSet};
use crate::utils::{BackupError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

pub const MANIFEST_FILE: &str = "backup_information.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Version of the installation that produced the backup
    pub gitlab_version: String,
    pub backup_created_at: DateTime<Utc>,
    /// Archiver identifier used for the per-component artifacts
    pub tar_version: String,
    /// Components with an artifact in the archive
    pub components: BTreeSet<Component>,
    /// Components skipped when the backup was taken
    #[serde(default)]
    pub skipped: BTreeSet<Component>,
    /// Project path -> storage name for every bundled repository
    #[serde(default)]
    pub repository_storages: BTreeMap<String, String>,
}

impl Manifest {
    pub fn new(gitlab_version: impl Into<String>, tar_version: impl Into<String>) -> Self {
        Self {
            gitlab_version: gitlab_version.into(),
            backup_created_at: Utc::now(),
            tar_version: tar_version.into(),
            components: BTreeSet::new(),
            skipped: BTreeSet::new(),
            repository_storages: BTreeMap::new(),
        }
    }

    /// Skipped at backup time, as a skip set for the restore side.
    pub fn skip_set(&self) -> SkipSet {
        self.skipped.iter().copied().collect()
    }

    pub fn write_to(&self, dir: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(dir.join(MANIFEST_FILE), json)?;
        Ok(())
    }

    pub fn read_from(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            BackupError::Archive(format!("cannot read {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_and_read_back() -> Result<()> {
        let dir = TempDir::new()?;
        let mut manifest = Manifest::new("8.17.0", "tar (gzip) 0.4");
        manifest.components.insert(Component::Database);
        manifest.skipped.insert(Component::Uploads);
        manifest
            .repository_storages
            .insert("group/project".to_string(), "custom".to_string());

        manifest.write_to(dir.path())?;
        let read = Manifest::read_from(dir.path())?;

        assert_eq!(read, manifest);
        assert!(read.skip_set().should_skip(Component::Uploads));
        Ok(())
    }

    #[test]
    fn test_missing_manifest_is_archive_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Manifest::read_from(dir.path()),
            Err(BackupError::Archive(_))
        ));
    }

    #[test]
    fn test_older_manifest_without_optional_fields() {
        let json = r#"{
            "gitlab_version": "8.16.0",
            "backup_created_at": "2017-01-20T10:00:00Z",
            "tar_version": "tar (GNU tar) 1.28",
            "components": ["db", "repositories"]
        }"#;
        let manifest: Manifest = serde_json::from_str(json).unwrap();
        assert!(manifest.skipped.is_empty());
        assert!(manifest.repository_storages.is_empty());
    }
}
