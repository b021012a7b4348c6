//! GitLab backup coordinator library.
//!
//! Builds `<timestamp>_gitlab_backup.tar` archives from the database,
//! repositories and file-tree components, and restores them in a fixed
//! order behind a version check.

pub mod archive;
pub mod component;
pub mod components;
pub mod config;
pub mod executor;
pub mod fs;
pub mod maintenance;
pub mod utils;

// Re-export commonly used types
pub use component::{Component, SkipSet};
pub use config::Config;
pub use executor::{BackupCoordinator, CreateOptions, RestoreOptions};
pub use utils::errors::BackupError;
pub type Result<T> = std::result::Result<T, BackupError>;
