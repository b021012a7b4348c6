//! Archive packing.
//!
//! Per-component artifacts are gzip-compressed tarballs produced through the
//! [`Archiver`] collaborator. The top-level backup is a plain tar holding
//! those artifacts plus the manifest.

use crate::utils::{BackupError, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tar::{Archive, Builder};
use tracing::debug;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Packs a directory into a single file and back.
pub trait Archiver: Send + Sync {
    /// Identifier recorded in the manifest.
    fn version(&self) -> String;

    fn pack(&self, source_dir: &Path, dest_file: &Path) -> Result<()>;

    fn unpack(&self, file: &Path, dest_dir: &Path) -> Result<()>;
}

/// In-process gzip tarball archiver.
#[derive(Debug, Default, Clone, Copy)]
pub struct TarGzArchiver;

impl Archiver for TarGzArchiver {
    fn version(&self) -> String {
        "tar-rs (gzip)".to_string()
    }

    fn pack(&self, source_dir: &Path, dest_file: &Path) -> Result<()> {
        debug!("Packing {} into {}", source_dir.display(), dest_file.display());
        if !source_dir.is_dir() {
            return Err(BackupError::Archive(format!(
                "{} is not a directory",
                source_dir.display()
            )));
        }

        let file = File::create(dest_file)?;
        let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        let mut builder = Builder::new(encoder);
        builder.follow_symlinks(false);
        builder.append_dir_all(".", source_dir)?;

        builder.into_inner()?.finish()?;
        Ok(())
    }

    fn unpack(&self, file: &Path, dest_dir: &Path) -> Result<()> {
        debug!("Unpacking {} into {}", file.display(), dest_dir.display());
        fs::create_dir_all(dest_dir)?;
        let decoder = GzDecoder::new(BufReader::new(File::open(file)?));
        let mut archive = Archive::new(decoder);
        archive.set_preserve_permissions(true);
        archive.unpack(dest_dir)?;
        Ok(())
    }
}

/// Write the top-level archive from `entries` under `staging_dir`, then set its mode.
pub fn bundle(staging_dir: &Path, entries: &[String], dest: &Path, mode: u32) -> Result<()> {
    let file = File::create(dest)?;
    let mut builder = Builder::new(BufWriter::new(file));
    builder.follow_symlinks(false);

    for entry in entries {
        let path = staging_dir.join(entry);
        if path.is_dir() {
            builder.append_dir_all(entry, &path)?;
        } else {
            builder.append_path_with_name(&path, entry)?;
        }
    }
    builder.into_inner()?;

    set_mode(dest, mode)
}

/// Extract the top-level archive into `dest_dir`, returning its root entry names.
pub fn unbundle(archive_path: &Path, dest_dir: &Path) -> Result<Vec<String>> {
    let mut archive = Archive::new(BufReader::new(File::open(archive_path)?));
    archive.set_preserve_permissions(true);

    let mut roots = Vec::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        if let Some(first) = path.components().next() {
            let root = first.as_os_str().to_string_lossy().to_string();
            if !roots.contains(&root) {
                roots.push(root);
            }
        }
        // unpack_in refuses paths escaping dest_dir
        if !entry.unpack_in(dest_dir)? {
            return Err(BackupError::Archive(format!(
                "refusing to unpack {} outside {}",
                path.display(),
                dest_dir.display()
            )));
        }
    }
    Ok(roots)
}

#[cfg(unix)]
pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
pub fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
