//! Custom error types for the backup coordinator.

use crate::component::Component;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(
        "GitLab version mismatch: your current GitLab version ({running}) differs from \
         the GitLab version in the backup ({recorded}). Please switch to the version \
         the backup was created with and try again"
    )]
    VersionMismatch { recorded: String, running: String },

    #[error("{component} step failed: {source}")]
    ComponentFailed {
        component: Component,
        #[source]
        source: Box<BackupError>,
    },

    #[error("Command `{command}` failed: {message}")]
    Command { command: String, message: String },

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("No backup archive found in {}", .0.display())]
    ArchiveNotFound(PathBuf),

    #[error(
        "Found more than one backup archive ({}). Pass the timestamp of the one to restore with BACKUP=timestamp",
        .0.join(", ")
    )]
    AmbiguousArchive(Vec<String>),

    #[error("Aborted: {0}")]
    Aborted(String),
}

impl BackupError {
    /// Wrap an error as the failure of one pipeline step.
    pub fn component(component: Component, source: BackupError) -> Self {
        BackupError::ComponentFailed {
            component,
            source: Box::new(source),
        }
    }

    /// Process exit status reported by the CLI for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            BackupError::VersionMismatch { .. } => 2,
            BackupError::Aborted(_) => 3,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
