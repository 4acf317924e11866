// src/exec/shell.rs

//! Host shell execution.

use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::debug;

use crate::context::ShellOutput;

/// Build a shell command appropriate for the platform.
pub fn shell_command(command: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(command);
        c
    }
}

/// Run `command` through the platform shell and capture its output.
///
/// A non-zero exit status is *not* an error here; callers decide what it
/// means. The child is killed if the returned future is dropped, which is
/// what happens when a run is cancelled or times out.
pub async fn run_shell(command: &str, cwd: Option<&Path>) -> Result<ShellOutput> {
    let mut cmd = shell_command(command);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    debug!(cmd = %command, "spawning shell command");

    let output = cmd
        .output()
        .await
        .with_context(|| format!("spawning shell for command '{}'", command))?;

    let exit_code = output.status.code().unwrap_or(-1);
    debug!(cmd = %command, exit_code, "shell command exited");

    Ok(ShellOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code,
    })
}
