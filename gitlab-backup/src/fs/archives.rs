//! Backup archives on disk: naming, selection for restore and pruning.

use crate::utils::{BackupError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const ARCHIVE_SUFFIX: &str = "_gitlab_backup.tar";

/// Archive file name for a backup taken at `timestamp` (unix seconds).
pub fn archive_name(timestamp: i64) -> String {
    format!("{}{}", timestamp, ARCHIVE_SUFFIX)
}

/// A `<timestamp>_gitlab_backup.tar` file in the backup directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupArchive {
    pub path: PathBuf,
    pub timestamp: i64,
}

impl BackupArchive {
    pub fn file_name(&self) -> String {
        archive_name(self.timestamp)
    }
}

fn parse_timestamp(file_name: &str) -> Option<i64> {
    file_name.strip_suffix(ARCHIVE_SUFFIX)?.parse().ok()
}

/// List archives in `dir`, oldest first. Files not following the naming scheme are ignored.
pub fn list(dir: &Path) -> Result<Vec<BackupArchive>> {
    let mut archives: Vec<BackupArchive> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|e| {
            let timestamp = parse_timestamp(&e.file_name().to_string_lossy())?;
            Some(BackupArchive {
                path: e.path(),
                timestamp,
            })
        })
        .collect();

    archives.sort_by_key(|a| a.timestamp);
    Ok(archives)
}

/// Pick the archive to restore.
///
/// With `backup` (a timestamp) the matching archive must exist. Without it,
/// the directory must contain exactly one archive.
pub fn select(dir: &Path, backup: Option<&str>) -> Result<PathBuf> {
    if let Some(timestamp) = backup {
        let path = dir.join(format!("{}{}", timestamp.trim(), ARCHIVE_SUFFIX));
        if path.is_file() {
            return Ok(path);
        }
        return Err(BackupError::ArchiveNotFound(path));
    }

    let mut archives = list(dir)?;
    match archives.len() {
        0 => Err(BackupError::ArchiveNotFound(dir.to_path_buf())),
        1 => Ok(archives.remove(0).path),
        _ => Err(BackupError::AmbiguousArchive(
            archives.iter().map(BackupArchive::file_name).collect(),
        )),
    }
}

/// Delete archives older than `keep_time` seconds relative to `now`.
///
/// `keep_time == 0` keeps everything. Returns the removed paths.
pub fn prune(dir: &Path, keep_time: u64, now: i64) -> Result<Vec<PathBuf>> {
    if keep_time == 0 {
        return Ok(Vec::new());
    }

    let cutoff = now.saturating_sub(i64::try_from(keep_time).unwrap_or(i64::MAX));
    let mut removed = Vec::new();
    for archive in list(dir)? {
        if archive.timestamp < cutoff {
            fs::remove_file(&archive.path)?;
            info!("Removed expired backup {}", archive.file_name());
            removed.push(archive.path);
        }
    }
    Ok(removed)
}
