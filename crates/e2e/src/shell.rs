//! Shell command helpers shared by the external collaborators

use std::path::Path;
use std::process::{ExitStatus, Stdio};

use tokio::process::Command;
use tracing::debug;

/// Whether a command's stdout reaches the terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    Quiet,
    Inherit,
}

/// Build `sh -c <command>` rooted at `dir`
pub fn sh(command: &str, dir: &Path) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command).current_dir(dir).stdin(Stdio::null());
    cmd
}

/// Run a command to completion and return its exit status
pub async fn run(command: &str, dir: &Path, output: Output) -> std::io::Result<ExitStatus> {
    debug!("$ {} (in {})", command, dir.display());

    let mut cmd = sh(command, dir);
    if output == Output::Quiet {
        cmd.stdout(Stdio::null());
    }
    cmd.status().await
}

/// Short description of a failed exit status
pub fn describe(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exited with status {}", code),
        None => "terminated by signal".to_string(),
    }
}
