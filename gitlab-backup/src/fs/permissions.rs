//! File mode and ownership helpers.
//!
//! Staging directories are owner-only so nothing inside the backup archive
//! carries group/other bits; restored trees get their ownership re-applied.

use crate::utils::{BackupError, Result};
use std::fs;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

#[cfg(unix)]
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};

/// Mode of every staging directory.
pub const PRIVATE_DIR_MODE: u32 = 0o700;

/// Create `path` (and parents) and force its mode to owner-only.
#[cfg(unix)]
pub fn create_private_dir(path: &Path) -> Result<()> {
    fs::DirBuilder::new()
        .recursive(true)
        .mode(PRIVATE_DIR_MODE)
        .create(path)?;
    // DirBuilder honours umask; chmod does not
    fs::set_permissions(path, fs::Permissions::from_mode(PRIVATE_DIR_MODE))?;
    Ok(())
}

#[cfg(not(unix))]
pub fn create_private_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    Ok(())
}

/// Remove a staging entry whether it is a file or a directory; missing is fine.
pub fn remove_entry(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path)?,
        Ok(_) => fs::remove_file(path)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Owner resolved from configured user and group names.
#[derive(Debug, Clone, Copy)]
pub struct Ownership {
    pub uid: nix::unistd::Uid,
    pub gid: nix::unistd::Gid,
}

impl Ownership {
    pub fn lookup(user: &str, group: &str) -> Result<Self> {
        let uid = nix::unistd::User::from_name(user)
            .map_err(|e| BackupError::Config(format!("cannot look up user {}: {}", user, e)))?
            .ok_or_else(|| BackupError::Config(format!("unknown user {}", user)))?
            .uid;
        let gid = nix::unistd::Group::from_name(group)
            .map_err(|e| BackupError::Config(format!("cannot look up group {}: {}", group, e)))?
            .ok_or_else(|| BackupError::Config(format!("unknown group {}", group)))?
            .gid;
        Ok(Self { uid, gid })
    }
}

/// Apply `owner` to every entry under `root` (symlinks are left alone).
///
/// Returns the number of entries changed; a missing root changes nothing.
pub fn chown_recursive(root: &Path, owner: Ownership) -> Result<usize> {
    if !root.exists() {
        return Ok(0);
    }

    let mut changed = 0;
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.path_is_symlink() {
            continue;
        }
        nix::unistd::chown(entry.path(), Some(owner.uid), Some(owner.gid)).map_err(|e| {
            BackupError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("chown {}: {}", entry.path().display(), e),
            ))
        })?;
        changed += 1;
    }
    debug!("Fixed ownership of {} entries under {}", changed, root.display());
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[cfg(unix)]
    #[test]
    fn test_private_dir_mode() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let dir = temp_dir.path().join("repositories/nested");
        create_private_dir(&dir)?;
        assert_eq!(fs::metadata(&dir)?.permissions().mode() & 0o777, 0o700);
        Ok(())
    }

    #[test]
    fn test_remove_entry_handles_files_dirs_and_missing() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let dir = temp_dir.path().join("db");
        fs::create_dir(&dir)?;
        fs::write(dir.join("database.sql.gz"), b"x")?;
        let file = temp_dir.path().join("lfs.tar.gz");
        fs::write(&file, b"x")?;

        remove_entry(&dir)?;
        remove_entry(&file)?;
        remove_entry(&temp_dir.path().join("missing"))?;

        assert!(!dir.exists());
        assert!(!file.exists());
        Ok(())
    }

    fn current_owner() -> Ownership {
        Ownership {
            uid: nix::unistd::Uid::effective(),
            gid: nix::unistd::Gid::effective(),
        }
    }

    #[test]
    fn test_chown_to_current_owner() -> Result<()> {
        let temp_dir = TempDir::new()?;
        fs::create_dir(temp_dir.path().join("sub"))?;
        fs::write(temp_dir.path().join("sub/file"), b"x")?;

        let changed = chown_recursive(temp_dir.path(), current_owner())?;
        assert_eq!(changed, 3);
        assert_eq!(chown_recursive(&temp_dir.path().join("missing"), current_owner())?, 0);
        Ok(())
    }
}
