//! gitlab-backup - Main entry point
//!
//! `gitlab-backup create` writes a new backup archive,
//! `gitlab-backup restore` restores one.

use clap::{Parser, Subcommand};
use gitlab_backup::executor::{CreateOptions, RestoreOptions};
use gitlab_backup::utils::confirm::{AssumeYes, Confirm, StdinPrompt};
use gitlab_backup::{utils, BackupCoordinator, Config, SkipSet};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Comma-separated components to skip (db,repositories,uploads,builds,artifacts,lfs,registry)
    #[arg(long, env = "SKIP", global = true)]
    skip: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a backup archive
    Create,

    /// Restore from a backup archive
    Restore {
        /// Timestamp of the archive to restore (required when several exist)
        #[arg(long, env = "BACKUP")]
        backup: Option<String>,

        /// Do not ask before dropping database tables
        #[arg(long)]
        force: bool,
    },
}

/// `force=yes` in the environment also skips confirmation prompts.
fn forced_by_env() -> bool {
    std::env::var("force")
        .map(|v| v.eq_ignore_ascii_case("yes"))
        .unwrap_or(false)
}

fn load_config(path: Option<&PathBuf>) -> gitlab_backup::Result<Config> {
    let mut config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.apply_env_overrides(|key| std::env::var(key).ok())?;
    Ok(config)
}

fn run(args: Args, config: Config) -> gitlab_backup::Result<()> {
    let skip = args.skip.as_deref().map(SkipSet::parse).unwrap_or_default();
    if !skip.is_empty() {
        tracing::info!("Skipping: {}", skip);
    }

    let coordinator = BackupCoordinator::from_config(config)?;

    match args.command {
        Command::Create => {
            let result = coordinator.create(&CreateOptions { skip })?;
            println!("Backup archive {} created", result.archive.display());
            for pruned in &result.pruned {
                println!("Removed expired backup {}", pruned.display());
            }
        }
        Command::Restore { backup, force } => {
            let confirm: Box<dyn Confirm> = if force || forced_by_env() {
                Box::new(AssumeYes)
            } else {
                Box::new(StdinPrompt)
            };
            let result = coordinator.restore(&RestoreOptions { skip, backup }, confirm.as_ref())?;
            println!("Restored from {}", result.archive.display());
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    let config = load_config(args.config.as_ref());

    // Initialize logging
    let level = args
        .log_level
        .clone()
        .or_else(|| config.as_ref().ok().map(|c| c.log.level.clone()))
        .unwrap_or_else(|| "info".to_string());
    if let Err(e) = utils::logger::init(&level) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    tracing::info!("Starting gitlab-backup v{}", env!("CARGO_PKG_VERSION"));

    match config.and_then(|config| run(args, config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
