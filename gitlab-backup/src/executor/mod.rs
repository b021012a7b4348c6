//! Backup coordinator - orchestrates the backup and restore pipelines.
//!
//! Backup: dump each non-skipped component into the staging directory,
//! write the manifest, pack everything into `<timestamp>_gitlab_backup.tar`,
//! then remove the staged artifacts.
//!
//! Restore: unpack the selected archive, refuse on version mismatch, reset
//! the schema, restore components in a fixed order, fix up ownership.
//!
//! Any component failure aborts the run; the error names the component.

pub mod manifest;
pub mod version_guard;

use crate::archive::{self, Archiver, TarGzArchiver};
use crate::component::{Component, SkipSet};
use crate::components::{self, ComponentTask, Maintenance};
use crate::config::Config;
use crate::fs::archives;
use crate::fs::permissions::{create_private_dir, remove_entry};
use crate::maintenance::SystemMaintenance;
use crate::utils::confirm::Confirm;
use crate::utils::{BackupError, Result};
use manifest::{Manifest, MANIFEST_FILE};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

const DROP_TABLES_QUESTION: &str =
    "Restoring the database will remove all existing tables. Do you want to continue?";

/// Options for one backup run
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub skip: SkipSet,
}

/// Options for one restore run
#[derive(Debug, Clone, Default)]
pub struct RestoreOptions {
    pub skip: SkipSet,
    /// Timestamp of the archive to restore; required when several exist
    pub backup: Option<String>,
}

/// Backup execution result
#[derive(Debug)]
pub struct BackupResult {
    pub archive: PathBuf,
    pub components: Vec<Component>,
    pub skipped: Vec<Component>,
    pub pruned: Vec<PathBuf>,
    pub duration_secs: u64,
}

/// Restore execution result
#[derive(Debug)]
pub struct RestoreResult {
    pub archive: PathBuf,
    pub restored: Vec<Component>,
    pub skipped: Vec<Component>,
    pub duration_secs: u64,
}

/// Staged entries under the backup path, removed when the run ends.
struct Staging<'a> {
    dir: &'a Path,
    entries: Vec<String>,
}

impl<'a> Staging<'a> {
    fn new(dir: &'a Path) -> Self {
        Self {
            dir,
            entries: Vec::new(),
        }
    }

    fn track(&mut self, entry: impl Into<String>) {
        let entry = entry.into();
        if !self.entries.contains(&entry) {
            self.entries.push(entry);
        }
    }
}

impl Drop for Staging<'_> {
    fn drop(&mut self) {
        for entry in &self.entries {
            if let Err(e) = remove_entry(&self.dir.join(entry)) {
                warn!("Failed to clean up {}: {}", entry, e);
            }
        }
    }
}

/// Main backup coordinator
pub struct BackupCoordinator {
    config: Config,
    running_version: String,
    archiver: Arc<dyn Archiver>,
    tasks: HashMap<Component, Box<dyn ComponentTask>>,
    maintenance: Box<dyn Maintenance>,
}

impl BackupCoordinator {
    /// Create a coordinator with explicit collaborators
    pub fn new(
        config: Config,
        running_version: impl Into<String>,
        archiver: Arc<dyn Archiver>,
        tasks: Vec<Box<dyn ComponentTask>>,
        maintenance: Box<dyn Maintenance>,
    ) -> Self {
        let tasks = tasks.into_iter().map(|t| (t.component(), t)).collect();
        Self {
            config,
            running_version: running_version.into(),
            archiver,
            tasks,
            maintenance,
        }
    }

    /// Create a coordinator wired to the production collaborators
    pub fn from_config(config: Config) -> Result<Self> {
        let running_version = config.running_version()?;
        let archiver: Arc<dyn Archiver> = Arc::new(TarGzArchiver);
        let tasks = components::default_tasks(&config, archiver.clone());
        let maintenance = Box::new(SystemMaintenance::from_config(&config));
        Ok(Self::new(config, running_version, archiver, tasks, maintenance))
    }

    /// Registry support being disabled skips the registry like an explicit entry.
    fn with_registry_gate(&self, skip: &SkipSet) -> SkipSet {
        let mut skip = skip.clone();
        if !self.config.registry.enabled {
            skip.insert(Component::Registry);
        }
        skip
    }

    fn task(&self, component: Component) -> Result<&dyn ComponentTask> {
        self.tasks
            .get(&component)
            .map(|t| t.as_ref())
            .ok_or_else(|| BackupError::Config(format!("no {} task configured", component)))
    }

    /// Execute a backup run
    pub fn create(&self, options: &CreateOptions) -> Result<BackupResult> {
        let start_time = Instant::now();
        let backup_dir = self.config.backup.path.as_path();
        if !backup_dir.exists() {
            create_private_dir(backup_dir)?;
        }

        let skip = self.with_registry_gate(&options.skip);
        let mut staging = Staging::new(backup_dir);
        let mut manifest = Manifest::new(self.running_version.clone(), self.archiver.version());
        let mut produced = Vec::new();

        info!("Starting backup of GitLab {}", self.running_version);

        for component in Component::BACKUP_ORDER {
            if skip.should_skip(component) {
                info!("Dumping {} ... [SKIPPED]", component);
                manifest.skipped.insert(component);
                continue;
            }

            info!("Dumping {} ...", component);
            let task = self.task(component)?;
            staging.track(component.artifact_name());
            // Leftovers of an interrupted run must not end up in this archive
            remove_entry(&backup_dir.join(component.artifact_name()))?;
            if let Err(e) = task.dump(backup_dir, &mut manifest) {
                error!("Dumping {} failed: {}", component, e);
                return Err(BackupError::component(component, e));
            }
            info!("Dumping {} ... done", component);

            manifest.components.insert(component);
            produced.push(component);
        }

        staging.track(MANIFEST_FILE);
        manifest.write_to(backup_dir)?;

        let timestamp = manifest.backup_created_at.timestamp();
        let archive_path = backup_dir.join(archives::archive_name(timestamp));
        if archive_path.exists() {
            return Err(BackupError::Archive(format!(
                "{} already exists",
                archive_path.display()
            )));
        }

        let mut entries: Vec<String> = produced
            .iter()
            .map(|c| c.artifact_name().to_string())
            .collect();
        entries.push(MANIFEST_FILE.to_string());

        info!("Creating backup archive: {}", archive_path.display());
        if let Err(e) = archive::bundle(
            backup_dir,
            &entries,
            &archive_path,
            self.config.backup.archive_permissions,
        ) {
            let _ = remove_entry(&archive_path);
            return Err(e);
        }

        // Staged artifacts are removed before pruning looks at the directory
        drop(staging);

        let pruned = archives::prune(backup_dir, self.config.backup.keep_time, timestamp)?;

        let duration_secs = start_time.elapsed().as_secs();
        info!(
            "Backup completed: {} ({} components, {} skipped, {}s)",
            archive_path.display(),
            produced.len(),
            manifest.skipped.len(),
            duration_secs
        );

        Ok(BackupResult {
            archive: archive_path,
            components: produced,
            skipped: manifest.skipped.into_iter().collect(),
            pruned,
            duration_secs,
        })
    }

    /// Execute a restore run
    pub fn restore(&self, options: &RestoreOptions, confirm: &dyn Confirm) -> Result<RestoreResult> {
        let start_time = Instant::now();
        let backup_dir = self.config.backup.path.as_path();

        let archive_path = archives::select(backup_dir, options.backup.as_deref())?;
        info!("Unpacking backup archive {}", archive_path.display());

        let mut staging = Staging::new(backup_dir);
        for component in Component::BACKUP_ORDER {
            staging.track(component.artifact_name());
        }
        staging.track(MANIFEST_FILE);
        // Unpack into a clean staging area so stale entries are never restored
        for entry in staging.entries.iter() {
            remove_entry(&backup_dir.join(entry))?;
        }

        for root in archive::unbundle(&archive_path, backup_dir)? {
            staging.track(root);
        }

        let manifest = Manifest::read_from(backup_dir)?;
        version_guard::check(&manifest, &self.running_version)?;

        let mut skip = self.with_registry_gate(&options.skip).union(&manifest.skip_set());
        for component in Component::RESTORE_ORDER {
            if !manifest.components.contains(&component) {
                skip.insert(component);
            }
        }

        if !skip.should_skip(Component::Database) {
            if !confirm.confirm(DROP_TABLES_QUESTION) {
                return Err(BackupError::Aborted("database restore declined".to_string()));
            }
            info!("Cleaning the database ...");
            self.maintenance
                .drop_tables()
                .map_err(|e| BackupError::component(Component::Database, e))?;
            info!("Cleaning the database ... done");
        }

        let mut restored = Vec::new();
        let mut skipped = Vec::new();
        for component in Component::RESTORE_ORDER {
            if skip.should_skip(component) {
                info!("Restoring {} ... [SKIPPED]", component);
                skipped.push(component);
                continue;
            }

            info!("Restoring {} ...", component);
            let task = self.task(component)?;
            if let Err(e) = task.restore(backup_dir, &manifest) {
                error!("Restoring {} failed: {}", component, e);
                return Err(BackupError::component(component, e));
            }
            info!("Restoring {} ... done", component);
            restored.push(component);
        }

        info!("Fixing ownership of restored files ...");
        self.maintenance.fix_permissions()?;

        let duration_secs = start_time.elapsed().as_secs();
        info!(
            "Restore completed from {} ({} components, {}s)",
            archive_path.display(),
            restored.len(),
            duration_secs
        );

        Ok(RestoreResult {
            archive: archive_path,
            restored,
            skipped,
            duration_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::confirm::AssumeYes;
    use std::sync::Mutex;
    use tempfile::TempDir;

    type Calls = Arc<Mutex<Vec<String>>>;

    struct FakeTask {
        component: Component,
        calls: Calls,
        fail_dump: bool,
        fail_restore: bool,
    }

    impl ComponentTask for FakeTask {
        fn component(&self) -> Component {
            self.component
        }

        fn dump(&self, staging_dir: &Path, _manifest: &mut Manifest) -> Result<()> {
            self.calls.lock().unwrap().push(format!("dump:{}", self.component));
            if self.fail_dump {
                return Err(BackupError::Archive("boom".to_string()));
            }
            let path = staging_dir.join(self.component.artifact_name());
            if self.component.artifact_is_dir() {
                std::fs::create_dir_all(&path)?;
            } else {
                std::fs::write(&path, b"artifact")?;
            }
            Ok(())
        }

        fn restore(&self, _staging_dir: &Path, _manifest: &Manifest) -> Result<()> {
            self.calls.lock().unwrap().push(format!("restore:{}", self.component));
            if self.fail_restore {
                return Err(BackupError::Archive("boom".to_string()));
            }
            Ok(())
        }
    }

    struct FakeMaintenance(Calls);

    impl Maintenance for FakeMaintenance {
        fn drop_tables(&self) -> Result<()> {
            self.0.lock().unwrap().push("drop_tables".to_string());
            Ok(())
        }

        fn fix_permissions(&self) -> Result<()> {
            self.0.lock().unwrap().push("fix_permissions".to_string());
            Ok(())
        }
    }

    fn coordinator(dir: &Path, failing: Option<Component>) -> (BackupCoordinator, Calls) {
        coordinator_with(dir, failing, None)
    }

    fn coordinator_with(
        dir: &Path,
        failing_dump: Option<Component>,
        failing_restore: Option<Component>,
    ) -> (BackupCoordinator, Calls) {
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let mut config = Config::default();
        config.backup.path = dir.to_path_buf();
        config.registry.enabled = true;

        let tasks = Component::BACKUP_ORDER
            .iter()
            .map(|&component| {
                Box::new(FakeTask {
                    component,
                    calls: calls.clone(),
                    fail_dump: failing_dump == Some(component),
                    fail_restore: failing_restore == Some(component),
                }) as Box<dyn ComponentTask>
            })
            .collect();

        let coordinator = BackupCoordinator::new(
            config,
            "8.17.0",
            Arc::new(TarGzArchiver),
            tasks,
            Box::new(FakeMaintenance(calls.clone())),
        );
        (coordinator, calls)
    }

    #[test]
    fn test_failed_dump_aborts_and_cleans_staging() {
        let dir = TempDir::new().unwrap();
        let (coordinator, calls) = coordinator(dir.path(), Some(Component::Builds));

        let err = coordinator.create(&CreateOptions::default()).unwrap_err();
        match err {
            BackupError::ComponentFailed { component, .. } => assert_eq!(component, Component::Builds),
            other => panic!("unexpected error: {other:?}"),
        }

        // Nothing after the failing component ran and nothing is left behind
        assert_eq!(calls.lock().unwrap().last().unwrap(), "dump:builds");
        assert!(!calls.lock().unwrap().contains(&"dump:artifacts".to_string()));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_disabled_registry_is_skipped() {
        let dir = TempDir::new().unwrap();
        let (mut coordinator, calls) = coordinator(dir.path(), None);
        coordinator.config.registry.enabled = false;

        let result = coordinator.create(&CreateOptions::default()).unwrap();
        assert_eq!(result.skipped, vec![Component::Registry]);
        assert!(!calls.lock().unwrap().contains(&"dump:registry".to_string()));
    }

    #[test]
    fn test_declined_confirmation_aborts_before_any_step() {
        struct No;
        impl Confirm for No {
            fn confirm(&self, _question: &str) -> bool {
                false
            }
        }

        let dir = TempDir::new().unwrap();
        let (coordinator, calls) = coordinator(dir.path(), None);
        coordinator.create(&CreateOptions::default()).unwrap();
        calls.lock().unwrap().clear();

        let err = coordinator.restore(&RestoreOptions::default(), &No).unwrap_err();
        assert!(matches!(err, BackupError::Aborted(_)));
        assert!(calls.lock().unwrap().is_empty());

        // Unpacked entries are cleaned up; only the archive remains
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_restore_skips_components_absent_from_archive() {
        let dir = TempDir::new().unwrap();
        let (coordinator, calls) = coordinator(dir.path(), None);
        coordinator
            .create(&CreateOptions {
                skip: SkipSet::parse("lfs"),
            })
            .unwrap();
        calls.lock().unwrap().clear();

        let result = coordinator.restore(&RestoreOptions::default(), &AssumeYes).unwrap();
        assert_eq!(result.skipped, vec![Component::Lfs]);
        assert!(!calls.lock().unwrap().contains(&"restore:lfs".to_string()));
    }

    #[test]
    fn test_failed_restore_stops_before_later_components_and_fix_up() {
        let dir = TempDir::new().unwrap();
        let (coordinator, calls) = coordinator_with(dir.path(), None, Some(Component::Builds));
        coordinator.create(&CreateOptions::default()).unwrap();
        calls.lock().unwrap().clear();

        let err = coordinator.restore(&RestoreOptions::default(), &AssumeYes).unwrap_err();
        match err {
            BackupError::ComponentFailed { component, .. } => assert_eq!(component, Component::Builds),
            other => panic!("unexpected error: {other:?}"),
        }

        assert_eq!(
            *calls.lock().unwrap(),
            vec!["drop_tables", "restore:db", "restore:repositories", "restore:builds"]
        );

        // Unpacked entries are cleaned up; only the archive remains
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_stale_staging_entries_are_not_archived() {
        let dir = TempDir::new().unwrap();
        let ghost = dir.path().join("repositories/ghost");
        std::fs::create_dir_all(&ghost).unwrap();
        std::fs::write(ghost.join("deleted-project.bundle"), b"stale").unwrap();
        std::fs::create_dir_all(dir.path().join("db")).unwrap();
        std::fs::write(dir.path().join("db/leftover.sql.gz"), b"stale").unwrap();

        let (coordinator, _calls) = coordinator(dir.path(), None);
        let result = coordinator.create(&CreateOptions::default()).unwrap();

        let mut archive = tar::Archive::new(std::fs::File::open(&result.archive).unwrap());
        let paths: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string())
            .collect();
        assert!(!paths.iter().any(|p| p.contains("ghost")), "{paths:?}");
        assert!(!paths.iter().any(|p| p.contains("leftover")), "{paths:?}");
    }

    #[test]
    fn test_restore_ignores_stale_entries_in_staging() {
        let dir = TempDir::new().unwrap();
        let (coordinator, _calls) = coordinator(dir.path(), None);
        coordinator.create(&CreateOptions::default()).unwrap();

        let ghost = dir.path().join("repositories/ghost");
        std::fs::create_dir_all(&ghost).unwrap();
        std::fs::write(ghost.join("deleted-project.bundle"), b"stale").unwrap();

        coordinator.restore(&RestoreOptions::default(), &AssumeYes).unwrap();
        assert!(!ghost.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
