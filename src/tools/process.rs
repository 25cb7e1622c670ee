//! Shell command execution with timeout enforcement
//!
//! Test runners need `source .venv/bin/activate` and `&&` chains, so
//! commands go through `bash -c`. A timed out child is killed when its
//! handle is dropped.

use crate::errors::{AgentError, Result};
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Captured outcome of one shell command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// None when killed by a signal or the timeout
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub duration: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Run `command` with `bash -c` in `cwd`, giving up after `limit`
pub async fn run_shell(command: &str, cwd: &Path, limit: Duration) -> Result<CommandOutput> {
    if command.trim().is_empty() {
        return Err(AgentError::ToolError("Command cannot be empty".to_string()));
    }

    let start = Instant::now();
    debug!(%command, cwd = %cwd.display(), "running shell command");

    let mut cmd = Command::new("bash");
    cmd.arg("-c")
        .arg(command)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    match timeout(limit, cmd.output()).await {
        Ok(Ok(output)) => Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code(),
            timed_out: false,
            duration: start.elapsed(),
        }),
        Ok(Err(e)) => Err(AgentError::ToolError(format!(
            "Failed to execute command: {}",
            e
        ))),
        Err(_) => Ok(CommandOutput {
            timed_out: true,
            duration: start.elapsed(),
            ..Default::default()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_shell_features_and_cwd() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "hello").unwrap();

        let out = run_shell("cat marker.txt && echo oops 1>&2", dir.path(), Duration::from_secs(10))
            .await
            .unwrap();

        assert!(out.success());
        assert_eq!(out.stdout, "hello");
        assert_eq!(out.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn test_nonzero_exit() {
        let dir = TempDir::new().unwrap();
        let out = run_shell("exit 3", dir.path(), Duration::from_secs(10)).await.unwrap();

        assert!(!out.success());
        assert_eq!(out.exit_code, Some(3));
    }

    #[tokio::test]
    async fn test_timeout() {
        let dir = TempDir::new().unwrap();
        let out = run_shell("sleep 5", dir.path(), Duration::from_millis(100)).await.unwrap();

        assert!(out.timed_out);
        assert!(!out.success());
        assert!(out.duration < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_empty_command() {
        let dir = TempDir::new().unwrap();
        assert!(run_shell("  ", dir.path(), Duration::from_secs(1)).await.is_err());
    }
}
