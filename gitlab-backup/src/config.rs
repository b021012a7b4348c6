//! Configuration management for the backup coordinator.
//!
//! Loads configuration from a TOML file; a handful of environment variables
//! override file values. The result is an immutable value handed to the
//! coordinator.

use crate::utils::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name of the file holding the running GitLab version under the install root.
pub const VERSION_FILE: &str = "VERSION";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gitlab: GitlabConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub repositories: RepositoriesConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub git: GitConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitlabConfig {
    /// Installation root (holds the VERSION file)
    pub root: PathBuf,

    /// Running version; read from `<root>/VERSION` when unset
    #[serde(default)]
    pub version: Option<String>,

    /// Owner applied to restored files
    #[serde(default = "default_user")]
    pub user: String,

    /// Group applied to restored files
    #[serde(default = "default_user")]
    pub group: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Directory holding archives; also used as the staging directory
    pub path: PathBuf,

    /// Mode bits applied to the finished archive (default 0o600)
    #[serde(default = "default_archive_permissions")]
    pub archive_permissions: u32,

    /// Archives older than this many seconds are pruned after a backup (0 keeps all)
    #[serde(default)]
    pub keep_time: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoriesConfig {
    /// Storage name -> filesystem root holding bare repositories
    pub storages: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub uploads: PathBuf,
    pub builds: PathBuf,
    pub artifacts: PathBuf,
    pub lfs: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    #[serde(default)]
    pub enabled: bool,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Command writing an SQL dump to stdout
    pub dump_command: Vec<String>,

    /// Command reading an SQL dump from stdin
    pub restore_command: Vec<String>,

    /// Command dropping every table of the application schema
    pub drop_tables_command: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    #[serde(default = "default_git_bin")]
    pub bin_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
const DEFAULT_ROOT: &str = "/home/git/gitlab";
const DEFAULT_DATABASE: &str = "gitlabhq_production";

fn default_user() -> String {
    "git".to_string()
}

fn default_archive_permissions() -> u32 {
    0o600
}

fn default_git_bin() -> PathBuf {
    PathBuf::from("/usr/bin/git")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

impl Default for GitlabConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
            version: None,
            user: default_user(),
            group: default_user(),
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            path: Path::new(DEFAULT_ROOT).join("tmp/backups"),
            archive_permissions: default_archive_permissions(),
            keep_time: 0,
        }
    }
}

impl Default for RepositoriesConfig {
    fn default() -> Self {
        let mut storages = BTreeMap::new();
        storages.insert("default".to_string(), PathBuf::from("/home/git/repositories"));
        Self { storages }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let root = Path::new(DEFAULT_ROOT);
        Self {
            uploads: root.join("public/uploads"),
            builds: root.join("builds"),
            artifacts: root.join("shared/artifacts"),
            lfs: root.join("shared/lfs-objects"),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: Path::new(DEFAULT_ROOT).join("shared/registry"),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dump_command: strings(&["pg_dump", "--clean", DEFAULT_DATABASE]),
            restore_command: strings(&["psql", "-q", DEFAULT_DATABASE]),
            drop_tables_command: strings(&[
                "psql",
                "-q",
                "-c",
                "DROP SCHEMA public CASCADE; CREATE SCHEMA public;",
                DEFAULT_DATABASE,
            ]),
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            bin_path: default_git_bin(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            gitlab: GitlabConfig::default(),
            backup: BackupConfig::default(),
            repositories: RepositoriesConfig::default(),
            paths: PathsConfig::default(),
            registry: RegistryConfig::default(),
            database: DatabaseConfig::default(),
            git: GitConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| BackupError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup` (normally `std::env::var`).
    ///
    /// Recognised: `GITLAB_BACKUP_PATH`, `GITLAB_BACKUP_ARCHIVE_PERMISSIONS`
    /// (octal, e.g. `0640`) and `GITLAB_VERSION`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("GITLAB_BACKUP_PATH") {
            self.backup.path = PathBuf::from(path);
        }
        if let Some(mode) = lookup("GITLAB_BACKUP_ARCHIVE_PERMISSIONS") {
            self.backup.archive_permissions = parse_octal(&mode)?;
        }
        if let Some(version) = lookup("GITLAB_VERSION") {
            self.gitlab.version = Some(version);
        }
        self.validate()
    }

    /// Version of the running installation, compared against backup manifests.
    pub fn running_version(&self) -> Result<String> {
        if let Some(version) = &self.gitlab.version {
            return Ok(version.trim().to_string());
        }

        let version_file = self.gitlab.root.join(VERSION_FILE);
        let version = std::fs::read_to_string(&version_file).map_err(|e| {
            BackupError::Config(format!(
                "cannot read GitLab version from {}: {}",
                version_file.display(),
                e
            ))
        })?;
        Ok(version.trim().to_string())
    }

    fn validate(&self) -> Result<()> {
        if self.backup.archive_permissions > 0o7777 {
            return Err(BackupError::Config(format!(
                "archive_permissions {:o} is not a valid mode",
                self.backup.archive_permissions
            )));
        }
        if self.repositories.storages.is_empty() {
            return Err(BackupError::Config(
                "at least one repository storage must be configured".to_string(),
            ));
        }
        for (name, command) in [
            ("dump_command", &self.database.dump_command),
            ("restore_command", &self.database.restore_command),
            ("drop_tables_command", &self.database.drop_tables_command),
        ] {
            if command.is_empty() {
                return Err(BackupError::Config(format!("database.{} is empty", name)));
            }
        }
        Ok(())
    }
}

/// Parse an octal mode string such as `0651`, `651` or `0o651`.
pub fn parse_octal(value: &str) -> Result<u32> {
    let digits = value.trim().trim_start_matches("0o");
    u32::from_str_radix(digits, 8)
        .map_err(|_| BackupError::Config(format!("invalid octal mode '{}'", value)))
}
