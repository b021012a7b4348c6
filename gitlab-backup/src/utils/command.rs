//! Blocking invocation of external programs (pg_dump, psql, git).

use crate::utils::{BackupError, Result};
use std::ffi::OsStr;
use std::io::{self, Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use tracing::debug;

/// Build a `Command` from an argv-style list.
pub fn build<S: AsRef<OsStr>>(argv: &[S]) -> Result<Command> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| BackupError::Config("empty command line".to_string()))?;
    let mut cmd = Command::new(program);
    cmd.args(args);
    Ok(cmd)
}

fn describe(cmd: &Command) -> String {
    let mut parts = vec![cmd.get_program().to_string_lossy().to_string()];
    parts.extend(cmd.get_args().map(|a| a.to_string_lossy().to_string()));
    parts.join(" ")
}

fn check(cmd: &Command, status: ExitStatus, stderr: &[u8]) -> Result<()> {
    if status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(stderr).trim().to_string();
    let message = match status.code() {
        Some(code) if stderr.is_empty() => format!("exited with status {}", code),
        Some(code) => format!("exited with status {}: {}", code, stderr),
        None => "terminated by signal".to_string(),
    };
    Err(BackupError::Command {
        command: describe(cmd),
        message,
    })
}

fn spawn_error(cmd: &Command, e: io::Error) -> BackupError {
    BackupError::Command {
        command: describe(cmd),
        message: e.to_string(),
    }
}

/// Run to completion, failing on a non-zero exit.
pub fn run(cmd: &mut Command) -> Result<()> {
    debug!("Running {}", describe(cmd));
    let output = cmd
        .stdin(Stdio::null())
        .output()
        .map_err(|e| spawn_error(cmd, e))?;
    check(cmd, output.status, &output.stderr)
}

/// Run to completion and return trimmed stdout.
pub fn run_capture(cmd: &mut Command) -> Result<String> {
    debug!("Running {}", describe(cmd));
    let output = cmd
        .stdin(Stdio::null())
        .output()
        .map_err(|e| spawn_error(cmd, e))?;
    check(cmd, output.status, &output.stderr)?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Run, streaming the child's stdout into `sink`.
pub fn run_to_writer(cmd: &mut Command, sink: &mut dyn Write) -> Result<u64> {
    debug!("Running {} (stdout captured)", describe(cmd));
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| spawn_error(cmd, e))?;

    let copied = match child.stdout.take() {
        Some(mut stdout) => io::copy(&mut stdout, sink),
        None => Ok(0),
    };
    let status = child.wait()?;
    check(cmd, status, &[])?;
    Ok(copied?)
}

/// Run, streaming `source` into the child's stdin.
pub fn run_from_reader(cmd: &mut Command, source: &mut dyn Read) -> Result<u64> {
    debug!("Running {} (stdin fed)", describe(cmd));
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| spawn_error(cmd, e))?;

    let copied = match child.stdin.take() {
        // stdin is dropped at the end of this arm so the child sees EOF
        Some(mut stdin) => io::copy(source, &mut stdin),
        None => Ok(0),
    };
    let status = child.wait()?;
    check(cmd, status, &[])?;
    Ok(copied?)
}
