//! Language-specific debugger backends
//!
//! - `JdbBackend`: Surefire forked JVM under JDWP, driven through `jdb`
//! - `IpdbBackend`: pytest stopping at an inserted `breakpoint()`, driven
//!   through IPython's terminal debugger
//!
//! Both launch inside the isolated working copy prepared by the session.

use super::expect::Interactive;
use super::ports::{kill_port_holders, wait_for_port};
use crate::errors::{AgentError, Result};
use crate::tools::process::run_shell;
use async_trait::async_trait;
use regex::bytes::Regex;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info};

pub const JDB_PROMPT: &str = r"\r?\n[A-Za-z0-9-_]+\[\d+\]";
pub const IPDB_PROMPT: &str = r"ipdb>";

#[async_trait]
pub trait DebugBackend: Send + Sync {
    /// Launch the program under the debugger and block until it is paused
    async fn launch(&mut self) -> Result<()>;

    /// All locals of the paused frame
    async fn locals(&mut self) -> Result<String>;

    /// Value of a variable or expression in the paused frame
    async fn evaluate(&mut self, expr: &str) -> Result<String>;

    /// Release every process; safe after a failed launch
    async fn shutdown(&mut self);

    /// Whether expression results may be memoized by the session
    fn caches_expressions(&self) -> bool;
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| AgentError::DebuggerError(format!("bad prompt pattern: {}", e)))
}

fn not_running() -> AgentError {
    AgentError::DebuggerError("debugger is not running".to_string())
}

/// JDWP + jdb session for one Maven test
pub struct JdbBackend {
    module_dir: PathBuf,
    test_class: String,
    test_target: String,
    line: usize,
    port: u16,
    port_wait: Duration,
    prompt_timeout: Duration,
    mvn: Option<Child>,
    jdb: Option<Interactive>,
}

impl JdbBackend {
    pub fn new(
        module_dir: PathBuf,
        test_class: impl Into<String>,
        test_target: impl Into<String>,
        line: usize,
        port: u16,
        port_wait: Duration,
        prompt_timeout: Duration,
    ) -> Self {
        Self {
            module_dir,
            test_class: test_class.into(),
            test_target: test_target.into(),
            line,
            port,
            port_wait,
            prompt_timeout,
            mvn: None,
            jdb: None,
        }
    }

    pub fn maven_command(port: u16, test_target: &str) -> String {
        format!(
            "mvn compiler:testCompile surefire:test \
             -Dmaven.surefire.debug=\"-agentlib:jdwp=transport=dt_socket,server=y,suspend=y,address={}\" \
             -o -Dtest=\"{}\"",
            port, test_target
        )
    }
}

#[async_trait]
impl DebugBackend for JdbBackend {
    async fn launch(&mut self) -> Result<()> {
        kill_port_holders(self.port).await;

        let command = Self::maven_command(self.port, &self.test_target);
        info!(port = self.port, target = %self.test_target, "starting maven under jdwp");
        let mvn = Command::new("bash")
            .arg("-c")
            .arg(&command)
            .current_dir(&self.module_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AgentError::DebuggerError(format!("Failed to start maven: {}", e)))?;
        self.mvn = Some(mvn);

        if !wait_for_port(self.port, self.port_wait).await {
            return Err(AgentError::DebuggerError(format!(
                "debug port {} did not open within {}s",
                self.port,
                self.port_wait.as_secs()
            )));
        }

        let mut jdb = Interactive::spawn(
            &format!("jdb -attach {}", self.port),
            &self.module_dir,
            compile(JDB_PROMPT)?,
            self.prompt_timeout,
        )?;
        let banner = jdb.expect_prompt().await?;
        debug!(%banner, "jdb attached");

        jdb.query(&format!("stop at {}:{}", self.test_class, self.line)).await?;
        jdb.query("run").await?;
        self.jdb = Some(jdb);

        info!(class = %self.test_class, line = self.line, "jdb paused at breakpoint");
        Ok(())
    }

    async fn locals(&mut self) -> Result<String> {
        self.jdb.as_mut().ok_or_else(not_running)?.query("locals").await
    }

    async fn evaluate(&mut self, expr: &str) -> Result<String> {
        self.jdb
            .as_mut()
            .ok_or_else(not_running)?
            .query(&format!("print {}", expr))
            .await
    }

    async fn shutdown(&mut self) {
        if let Some(mut jdb) = self.jdb.take() {
            jdb.shutdown("exit").await;
        }
        if let Some(mut mvn) = self.mvn.take() {
            let _ = mvn.kill().await;
        }
        kill_port_holders(self.port).await;
    }

    fn caches_expressions(&self) -> bool {
        true
    }
}

/// pytest + IPython debugger session for one Python test
pub struct IpdbBackend {
    repo_path: PathBuf,
    debug_repo: PathBuf,
    test_target: String,
    prompt_timeout: Duration,
    ipdb: Option<Interactive>,
}

impl IpdbBackend {
    pub fn new(
        repo_path: PathBuf,
        debug_repo: PathBuf,
        test_target: impl Into<String>,
        prompt_timeout: Duration,
    ) -> Self {
        Self {
            repo_path,
            debug_repo,
            test_target: test_target.into(),
            prompt_timeout,
            ipdb: None,
        }
    }

    /// `-n0` when pytest-xdist is installed, so the test runs in-process
    async fn xdist_arg(&self) -> String {
        let probe = "source .venv/bin/activate\n\
                     if python -c \"import xdist\" &>/dev/null; then\n    echo \"-n0\"\nelse\n    echo \"\"\nfi\n";
        match run_shell(probe, &self.repo_path, Duration::from_secs(30)).await {
            Ok(out) => out.stdout.trim().to_string(),
            Err(_) => String::new(),
        }
    }

    pub fn pytest_command(debug_repo: &str, xdist: &str, test_target: &str) -> String {
        format!(
            "source .venv/bin/activate && cd {} && export IPY_TEST_SIMPLE_PROMPT=1 && \
             PYTHONUNBUFFERED=1 pytest --capture=no -s {} --pdbcls=IPython.terminal.debugger:TerminalPdb {}",
            debug_repo, xdist, test_target
        )
    }
}

#[async_trait]
impl DebugBackend for IpdbBackend {
    async fn launch(&mut self) -> Result<()> {
        let xdist = self.xdist_arg().await;
        let command = Self::pytest_command(
            &self.debug_repo.to_string_lossy(),
            &xdist,
            &self.test_target,
        );
        info!(target = %self.test_target, "starting pytest under ipdb");

        let mut ipdb = Interactive::spawn(&command, &self.repo_path, compile(IPDB_PROMPT)?, self.prompt_timeout)?;
        let banner = ipdb.expect_prompt().await?;
        debug!(%banner, "ipdb paused at breakpoint");
        self.ipdb = Some(ipdb);
        Ok(())
    }

    async fn locals(&mut self) -> Result<String> {
        self.ipdb.as_mut().ok_or_else(not_running)?.query("locals()").await
    }

    async fn evaluate(&mut self, expr: &str) -> Result<String> {
        self.ipdb
            .as_mut()
            .ok_or_else(not_running)?
            .query(&format!("p {}", expr))
            .await
    }

    async fn shutdown(&mut self) {
        if let Some(mut ipdb) = self.ipdb.take() {
            ipdb.shutdown("q").await;
        }
    }

    fn caches_expressions(&self) -> bool {
        false
    }
}
