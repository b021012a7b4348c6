//! Database dump and restore through external client programs.
//!
//! The dump is streamed from the dump command's stdout through gzip into
//! `db/database.sql.gz`; restore streams it back into the restore command.

use super::ComponentTask;
use crate::component::Component;
use crate::config::DatabaseConfig;
use crate::executor::manifest::Manifest;
use crate::fs::permissions::create_private_dir;
use crate::utils::{command, BackupError, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

pub const DUMP_FILE: &str = "database.sql.gz";

pub struct Database {
    config: DatabaseConfig,
}

impl Database {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }

    fn dump_path(staging_dir: &Path) -> PathBuf {
        staging_dir
            .join(Component::Database.artifact_name())
            .join(DUMP_FILE)
    }

    pub fn drop_tables(&self) -> Result<()> {
        info!("Dropping all tables");
        let mut cmd = command::build(&self.config.drop_tables_command)?;
        command::run(&mut cmd)
    }
}

impl ComponentTask for Database {
    fn component(&self) -> Component {
        Component::Database
    }

    fn dump(&self, staging_dir: &Path, _manifest: &mut Manifest) -> Result<()> {
        create_private_dir(&staging_dir.join(Component::Database.artifact_name()))?;
        let path = Self::dump_path(staging_dir);

        let mut encoder = GzEncoder::new(BufWriter::new(File::create(&path)?), Compression::default());
        let mut cmd = command::build(&self.config.dump_command)?;
        let bytes = command::run_to_writer(&mut cmd, &mut encoder)?;
        encoder.finish()?.flush()?;

        info!("Database dump written ({} bytes uncompressed)", bytes);
        Ok(())
    }

    fn restore(&self, staging_dir: &Path, _manifest: &Manifest) -> Result<()> {
        let path = Self::dump_path(staging_dir);
        if !path.is_file() {
            return Err(BackupError::Archive(format!(
                "database dump {} missing from backup",
                path.display()
            )));
        }

        let mut decoder = GzDecoder::new(BufReader::new(File::open(&path)?));
        let mut cmd = command::build(&self.config.restore_command)?;
        let bytes = command::run_from_reader(&mut cmd, &mut decoder)?;

        info!("Database restored ({} bytes uncompressed)", bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[test]
    fn test_dump_then_restore_streams_sql() -> Result<()> {
        let staging = TempDir::new()?;
        let sink = staging.path().join("restored.sql");

        let db = Database::new(DatabaseConfig {
            dump_command: sh("printf 'CREATE TABLE projects (id int);'"),
            restore_command: sh(&format!("cat > {}", sink.display())),
            drop_tables_command: sh("true"),
        });

        let mut manifest = Manifest::new("8.17.0", "tar");
        db.dump(staging.path(), &mut manifest)?;
        assert!(staging.path().join("db/database.sql.gz").is_file());

        db.restore(staging.path(), &manifest)?;
        assert_eq!(
            std::fs::read_to_string(&sink)?,
            "CREATE TABLE projects (id int);"
        );
        db.drop_tables()?;
        Ok(())
    }

    #[test]
    fn test_failing_dump_command_is_reported() {
        let staging = TempDir::new().unwrap();
        let db = Database::new(DatabaseConfig {
            dump_command: sh("exit 1"),
            restore_command: sh("true"),
            drop_tables_command: sh("true"),
        });
        let mut manifest = Manifest::new("8.17.0", "tar");
        assert!(matches!(
            db.dump(staging.path(), &mut manifest),
            Err(BackupError::Command { .. })
        ));
    }

    #[test]
    fn test_restore_without_dump_fails() {
        let staging = TempDir::new().unwrap();
        let db = Database::new(DatabaseConfig::default());
        let manifest = Manifest::new("8.17.0", "tar");
        assert!(matches!(
            db.restore(staging.path(), &manifest),
            Err(BackupError::Archive(_))
        ));
    }
}
