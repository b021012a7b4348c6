//! Refuses to restore a backup taken by a different GitLab version.

use super::manifest::Manifest;
use crate::utils::{BackupError, Result};

/// Exact comparison of the recorded and running versions.
pub fn check(manifest: &Manifest, running_version: &str) -> Result<()> {
    if manifest.gitlab_version == running_version {
        Ok(())
    } else {
        Err(BackupError::VersionMismatch {
            recorded: manifest.gitlab_version.clone(),
            running: running_version.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match() {
        let manifest = Manifest::new("8.17.0", "tar");
        assert!(check(&manifest, "8.17.0").is_ok());
    }

    #[test]
    fn test_mismatch_is_exact() {
        let manifest = Manifest::new("not 8.17.0", "tar");
        let err = check(&manifest, "8.17.0").unwrap_err();
        assert!(matches!(err, BackupError::VersionMismatch { .. }));

        // No normalisation: a pre-release is a different version.
        let manifest = Manifest::new("8.17.0-pre", "tar");
        assert!(check(&manifest, "8.17.0").is_err());
    }
}
