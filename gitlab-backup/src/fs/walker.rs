//! Repository discovery on storage roots.
//!
//! Each storage holds bare repositories laid out as
//! `<namespace>/<project>.git`. Wiki repositories (`*.wiki.git`) are not
//! part of the repositories backup.

use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

const GIT_SUFFIX: &str = ".git";
const WIKI_SUFFIX: &str = ".wiki.git";

/// A bare repository found under a storage root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryInfo {
    /// Storage name the repository lives in
    pub storage: String,

    /// Absolute path of the bare repository directory
    pub path: PathBuf,

    /// Project path with namespace, without the `.git` suffix
    pub path_with_namespace: String,
}

/// Walk a storage root and collect every bare project repository, sorted by path.
///
/// A missing storage root yields no repositories.
pub fn find_repositories(storage: &str, root: &Path) -> std::io::Result<Vec<RepositoryInfo>> {
    if !root.exists() {
        warn!("Storage '{}' root {} does not exist", storage, root.display());
        return Ok(Vec::new());
    }

    let mut repos = Vec::new();
    let mut walker = WalkDir::new(root).follow_links(false).min_depth(1).into_iter();

    while let Some(entry) = walker.next() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_dir() {
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        if !name.ends_with(GIT_SUFFIX) {
            continue;
        }

        // Nothing below a repository directory is another repository
        walker.skip_current_dir();

        if name.ends_with(WIKI_SUFFIX) {
            continue;
        }

        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let relative = relative.to_string_lossy();
        let path_with_namespace = relative.trim_end_matches(GIT_SUFFIX).to_string();

        repos.push(RepositoryInfo {
            storage: storage.to_string(),
            path: entry.path().to_path_buf(),
            path_with_namespace,
        });
    }

    repos.sort_by(|a, b| a.path_with_namespace.cmp(&b.path_with_namespace));
    Ok(repos)
}
