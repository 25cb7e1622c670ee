//! Prompt-driven interaction with a line-oriented debugger process
//!
//! Output from stdout and stderr is pumped into one buffer by background
//! tasks. `expect_prompt` waits until the prompt pattern shows up and
//! returns everything printed before it.

use crate::errors::{AgentError, Result};
use bytes::BytesMut;
use regex::bytes::Regex;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, trace};

pub struct Interactive {
    child: Child,
    stdin: ChildStdin,
    output: mpsc::UnboundedReceiver<Vec<u8>>,
    buffer: BytesMut,
    prompt: Regex,
    timeout: Duration,
}

fn pump<R>(mut reader: R, tx: mpsc::UnboundedSender<Vec<u8>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0u8; 4096];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send(chunk[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });
}

impl Interactive {
    /// Spawn `command` through `bash -c` in `cwd`
    pub fn spawn(command: &str, cwd: &Path, prompt: Regex, timeout: Duration) -> Result<Self> {
        debug!(%command, cwd = %cwd.display(), "spawning interactive process");

        let mut child = Command::new("bash")
            .arg("-c")
            .arg(command)
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AgentError::DebuggerError(format!("Failed to spawn `{}`: {}", command, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AgentError::DebuggerError("child stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::DebuggerError("child stdout unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AgentError::DebuggerError("child stderr unavailable".to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        pump(stdout, tx.clone());
        pump(stderr, tx);

        Ok(Self {
            child,
            stdin,
            output: rx,
            buffer: BytesMut::new(),
            prompt,
            timeout,
        })
    }

    /// Wait for the prompt; returns the output printed before it
    pub async fn expect_prompt(&mut self) -> Result<String> {
        let deadline = Instant::now() + self.timeout;

        loop {
            if let Some(m) = self.prompt.find(&self.buffer) {
                let (start, end) = (m.start(), m.end());
                let consumed = self.buffer.split_to(end);
                let before = String::from_utf8_lossy(&consumed[..start]).into_owned();
                trace!(output = %before, "prompt reached");
                return Ok(before);
            }

            match timeout_at(deadline, self.output.recv()).await {
                Ok(Some(chunk)) => self.buffer.extend_from_slice(&chunk),
                Ok(None) => {
                    return Err(AgentError::DebuggerError(format!(
                        "process exited before prompt; last output: {}",
                        crate::syntax::last_lines(&String::from_utf8_lossy(&self.buffer), 5)
                    )))
                }
                Err(_) => {
                    return Err(AgentError::Timeout {
                        duration_ms: self.timeout.as_millis() as u64,
                    })
                }
            }
        }
    }

    /// Write one line to the process
    pub async fn send_line(&mut self, line: &str) -> Result<()> {
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }

    /// Send `command` and return its output with any echoed command line removed
    pub async fn query(&mut self, command: &str) -> Result<String> {
        self.send_line(command).await?;
        let before = self.expect_prompt().await?;
        Ok(strip_echo(&before, command))
    }

    /// Send a final line and kill whatever is left
    pub async fn shutdown(&mut self, farewell: &str) {
        let _ = self.send_line(farewell).await;
        let _ = tokio::time::timeout(Duration::from_secs(2), self.child.wait()).await;
        let _ = self.child.kill().await;
    }
}

/// Drop the first line when it is a terminal echo of `command` or blank
pub fn strip_echo(output: &str, command: &str) -> String {
    let mut lines = output.lines();
    match lines.next() {
        Some(first) if first.trim().is_empty() || first.trim() == command.trim() => {
            lines.collect::<Vec<_>>().join("\n")
        }
        Some(_) => output.trim_start_matches(['\r', '\n']).to_string(),
        None => String::new(),
    }
}
