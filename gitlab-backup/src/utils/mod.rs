//! Utility modules for the backup coordinator.

pub mod command;
pub mod confirm;
pub mod errors;
pub mod logger;

pub use errors::{BackupError, Result};
