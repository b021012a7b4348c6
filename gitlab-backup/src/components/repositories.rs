//! Repository bundles across every configured storage.
//!
//! Every project repository becomes `repositories/<path_with_namespace>.bundle`;
//! the storage each one came from is recorded in the manifest so restore can
//! clone it back into the same storage.

use super::ComponentTask;
use crate::component::Component;
use crate::executor::manifest::Manifest;
use crate::fs::permissions::create_private_dir;
use crate::fs::walker::{find_repositories, RepositoryInfo};
use crate::utils::{command, BackupError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

const BUNDLE_SUFFIX: &str = ".bundle";
const DEFAULT_STORAGE: &str = "default";

pub struct Repositories {
    storages: BTreeMap<String, PathBuf>,
    git_bin: PathBuf,
}

impl Repositories {
    pub fn new(storages: BTreeMap<String, PathBuf>, git_bin: PathBuf) -> Self {
        Self { storages, git_bin }
    }

    fn git(&self) -> std::process::Command {
        std::process::Command::new(&self.git_bin)
    }

    fn is_empty_repository(&self, repo: &RepositoryInfo) -> Result<bool> {
        let refs = command::run_capture(
            self.git()
                .arg("--git-dir")
                .arg(&repo.path)
                .args(["for-each-ref", "--count=1"]),
        )?;
        Ok(refs.is_empty())
    }

    fn bundle(&self, repo: &RepositoryInfo, dest: &Path) -> Result<()> {
        command::run(
            self.git()
                .arg("--git-dir")
                .arg(&repo.path)
                .args(["bundle", "create"])
                .arg(dest)
                .arg("--all"),
        )
    }

    fn storage_root(&self, storage: &str) -> Result<&Path> {
        self.storages
            .get(storage)
            .map(PathBuf::as_path)
            .ok_or_else(|| {
                BackupError::Config(format!("repository storage '{}' is not configured", storage))
            })
    }

    /// Move every existing storage root aside before cloning into it.
    fn move_storages_aside(&self) -> Result<()> {
        let timestamp = chrono::Utc::now().timestamp();
        for (name, root) in &self.storages {
            if !root.exists() {
                continue;
            }
            let aside = PathBuf::from(format!("{}.old.{}", root.display(), timestamp));
            std::fs::rename(root, &aside)?;
            info!("Moved storage '{}' to {}", name, aside.display());
        }
        Ok(())
    }
}

impl ComponentTask for Repositories {
    fn component(&self) -> Component {
        Component::Repositories
    }

    fn dump(&self, staging_dir: &Path, manifest: &mut Manifest) -> Result<()> {
        let backup_dir = staging_dir.join(Component::Repositories.artifact_name());
        create_private_dir(&backup_dir)?;

        for (storage, root) in &self.storages {
            let repos = find_repositories(storage, root)?;
            info!("Storage '{}': {} repositories", storage, repos.len());

            for repo in repos {
                if let Some(other) = manifest.repository_storages.get(&repo.path_with_namespace) {
                    return Err(BackupError::Archive(format!(
                        "{} exists in both storage '{}' and '{}'",
                        repo.path_with_namespace, other, repo.storage
                    )));
                }

                if self.is_empty_repository(&repo)? {
                    info!(" * {} ... [SKIPPED] (empty repository)", repo.path_with_namespace);
                    continue;
                }

                let dest = backup_dir.join(format!("{}{}", repo.path_with_namespace, BUNDLE_SUFFIX));
                if let Some(parent) = dest.parent() {
                    create_private_dir(parent)?;
                }
                self.bundle(&repo, &dest)?;
                info!(" * {} ({}) ... [DONE]", repo.path_with_namespace, repo.storage);

                manifest
                    .repository_storages
                    .insert(repo.path_with_namespace, repo.storage);
            }
        }
        Ok(())
    }

    fn restore(&self, staging_dir: &Path, manifest: &Manifest) -> Result<()> {
        let backup_dir = staging_dir.join(Component::Repositories.artifact_name());
        if !backup_dir.is_dir() {
            return Err(BackupError::Archive(
                "repositories directory missing from backup".to_string(),
            ));
        }

        self.move_storages_aside()?;
        for root in self.storages.values() {
            std::fs::create_dir_all(root)?;
        }

        for entry in WalkDir::new(&backup_dir).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            let name = entry.file_name().to_string_lossy();
            if !entry.file_type().is_file() || !name.ends_with(BUNDLE_SUFFIX) {
                continue;
            }

            let relative = entry.path().strip_prefix(&backup_dir).unwrap_or(entry.path());
            let relative = relative.to_string_lossy();
            let path_with_namespace = relative.trim_end_matches(BUNDLE_SUFFIX);

            let storage = match manifest.repository_storages.get(path_with_namespace) {
                Some(storage) => storage.as_str(),
                None => {
                    warn!("No storage recorded for {}, using '{}'", path_with_namespace, DEFAULT_STORAGE);
                    DEFAULT_STORAGE
                }
            };
            let target = self
                .storage_root(storage)?
                .join(format!("{}.git", path_with_namespace));
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }

            command::run(
                self.git()
                    .args(["clone", "--bare", "--quiet"])
                    .arg(entry.path())
                    .arg(&target),
            )?;
            info!(" * {} ({}) ... [DONE]", path_with_namespace, storage);
        }
        Ok(())
    }
}
