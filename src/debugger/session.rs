//! Debugger session over an isolated working copy
//!
//! Starting a session copies the repository into the debug cache, writes
//! the breakpoint variant of the test file into the copy and launches the
//! backend there. The real repository is never touched, so test runs and
//! the debugger can coexist.
//!
//! - Start is attempted a few times with a short backoff
//! - Queries are answered only while paused
//! - `close` is idempotent and removes the working copy

use super::backend::{DebugBackend, IpdbBackend, JdbBackend};
use super::state::{SessionEvent, SessionState};
use crate::config::PipelineConfig;
use crate::errors::{AgentError, Result};
use crate::syntax::{insert_python_breakpoint, replace_lines};
use crate::types::{Language, TaskContext};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub const START_ATTEMPTS: usize = 3;
pub const START_BACKOFF: Duration = Duration::from_millis(200);

/// Statement that stands in for the placeholder in the Java debug copy
pub const JAVA_BREAKPOINT_STATEMENT: &str = "boolean __breakpoint__ = true;";

pub struct DebuggerSession {
    state: SessionState,
    backend: Box<dyn DebugBackend>,
    source_repo: PathBuf,
    work_dir: PathBuf,
    /// Test file path relative to the repository root
    debug_file: PathBuf,
    debug_content: String,
    excluded: Vec<String>,
    attempts: usize,
    backoff: Duration,
}

/// Test file content with the program stopped at the placeholder line
pub fn debug_file_content(ctx: &TaskContext, original: &str, masked: &str) -> Result<String> {
    match ctx.language {
        Language::Java => Ok(masked.replace(&ctx.placeholder, JAVA_BREAKPOINT_STATEMENT)),
        Language::Python => {
            let prefix = &ctx.test_prefix;
            let relative = ctx
                .oracle_line
                .checked_sub(prefix.start_line)
                .map(|offset| offset + 1)
                .ok_or_else(|| {
                    AgentError::ParseError(format!(
                        "oracle line {} precedes test start {}",
                        ctx.oracle_line, prefix.start_line
                    ))
                })?;
            let with_breakpoint = insert_python_breakpoint(&prefix.text, relative)?;
            Ok(replace_lines(original, &with_breakpoint, prefix.start_line, prefix.end_line))
        }
    }
}

impl DebuggerSession {
    pub fn new(
        backend: Box<dyn DebugBackend>,
        source_repo: PathBuf,
        work_dir: PathBuf,
        debug_file: PathBuf,
        debug_content: String,
    ) -> Self {
        Self {
            state: SessionState::NotStarted,
            backend,
            source_repo,
            work_dir,
            debug_file,
            debug_content,
            excluded: Vec::new(),
            attempts: START_ATTEMPTS,
            backoff: START_BACKOFF,
        }
    }

    /// Session for `ctx` using the backend that matches its language
    pub fn for_task(
        ctx: &TaskContext,
        pipeline: &PipelineConfig,
        port: u16,
        debug_content: String,
    ) -> Self {
        let work_dir = ctx.debug_cache_dir.join(&ctx.repo_name);
        let prompt_timeout = Duration::from_secs(pipeline.debugger_prompt_timeout_secs);

        let backend: Box<dyn DebugBackend> = match ctx.language {
            Language::Java => {
                let module_dir = if ctx.sub_repo.is_empty() {
                    work_dir.clone()
                } else {
                    work_dir.join(&ctx.sub_repo)
                };
                Box::new(JdbBackend::new(
                    module_dir,
                    ctx.test_class.clone(),
                    ctx.test_target.clone(),
                    ctx.oracle_line,
                    port,
                    Duration::from_secs(pipeline.debugger_port_wait_secs),
                    prompt_timeout,
                ))
            }
            Language::Python => Box::new(IpdbBackend::new(
                ctx.repo_path.clone(),
                work_dir.clone(),
                ctx.test_target.clone(),
                prompt_timeout,
            )),
        };

        let mut session = Self::new(
            backend,
            ctx.repo_path.clone(),
            work_dir,
            PathBuf::from(&ctx.test_prefix_file),
            debug_content,
        )
        .with_attempts(pipeline.debugger_start_attempts, START_BACKOFF);
        if ctx.language == Language::Python {
            // the virtualenv is used in place from the real repository
            session.excluded.push(".venv".to_string());
        }
        session
    }

    pub fn with_attempts(mut self, attempts: usize, backoff: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.backoff = backoff;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn caches_expressions(&self) -> bool {
        self.backend.caches_expressions()
    }

    /// Prepare the working copy and launch until the breakpoint is hit
    ///
    /// On final failure the session is closed and the last error returned.
    pub async fn start(&mut self) -> Result<()> {
        self.state = self.state.transition(SessionEvent::Start)?;
        info!(work_dir = %self.work_dir.display(), "starting debugger session");

        if let Err(e) = self.prepare_copy().await {
            warn!(error = %e, "failed to prepare debug copy");
            self.close().await;
            return Err(e);
        }

        let mut last_error = None;
        for attempt in 1..=self.attempts {
            match self.backend.launch().await {
                Ok(()) => {
                    self.state = self.state.transition(SessionEvent::BreakpointHit)?;
                    info!(attempt, "debugger paused at breakpoint");
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, error = %e, "debugger start attempt failed");
                    self.backend.shutdown().await;
                    last_error = Some(e);
                    if attempt < self.attempts {
                        tokio::time::sleep(self.backoff).await;
                    }
                }
            }
        }

        self.state = self.state.transition(SessionEvent::StartFailed)?;
        self.close().await;
        Err(last_error.unwrap_or_else(|| AgentError::DebuggerError("debugger did not start".to_string())))
    }

    async fn prepare_copy(&self) -> Result<()> {
        let source = self.source_repo.clone();
        let target = self.work_dir.clone();
        let excluded = self.excluded.clone();

        tokio::task::spawn_blocking(move || copy_tree(&source, &target, &excluded))
            .await
            .map_err(|e| AgentError::Generic(format!("copy task panicked: {}", e)))??;

        let debug_path = self.work_dir.join(&self.debug_file);
        tokio::fs::write(&debug_path, &self.debug_content).await?;
        debug!(path = %debug_path.display(), "debug file written");
        Ok(())
    }

    fn ensure_paused(&self) -> Result<()> {
        if self.state.accepts_queries() {
            Ok(())
        } else {
            Err(AgentError::DebuggerError(format!(
                "debugger is not paused ({})",
                self.state.display_name()
            )))
        }
    }

    pub async fn locals(&mut self) -> Result<String> {
        self.ensure_paused()?;
        self.backend.locals().await
    }

    pub async fn evaluate(&mut self, expr: &str) -> Result<String> {
        self.ensure_paused()?;
        self.backend.evaluate(expr).await
    }

    /// Release the backend and remove the working copy; safe to repeat
    pub async fn close(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.backend.shutdown().await;
        if tokio::fs::metadata(&self.work_dir).await.is_ok() {
            if let Err(e) = tokio::fs::remove_dir_all(&self.work_dir).await {
                warn!(error = %e, path = %self.work_dir.display(), "failed to remove debug copy");
            }
        }
        self.state = SessionState::Closed;
        debug!("debugger session closed");
    }
}

/// Copy `source` into a fresh `target`, skipping top-level `excluded` names
pub fn copy_tree(source: &Path, target: &Path, excluded: &[String]) -> Result<()> {
    if target.exists() {
        std::fs::remove_dir_all(target)?;
    }
    std::fs::create_dir_all(target)?;

    let walker = WalkDir::new(source).follow_links(false).into_iter().filter_entry(|entry| {
        entry.depth() != 1
            || !excluded
                .iter()
                .any(|name| entry.file_name().to_string_lossy() == name.as_str())
    });

    for entry in walker {
        let entry = entry.map_err(|e| AgentError::Generic(format!("walk failed: {}", e)))?;
        let relative = match entry.path().strip_prefix(source) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel,
            _ => continue,
        };
        let dest = target.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            std::fs::create_dir_all(&dest)?;
        } else if file_type.is_symlink() {
            let link = std::fs::read_link(entry.path())?;
            #[cfg(unix)]
            std::os::unix::fs::symlink(&link, &dest)?;
            #[cfg(not(unix))]
            let _ = link;
        } else {
            std::fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}
