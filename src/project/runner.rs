//! Test runners for the two supported ecosystems
//!
//! Each runner executes the single test target of a task and turns the
//! resulting JUnit report into a `TestReport`. When no report is written
//! the tail of stdout becomes the summary instead.

use super::report::{summarize_pytest, summarize_surefire, TestReport};
use crate::config::PipelineConfig;
use crate::errors::Result;
use crate::syntax::last_lines;
use crate::tools::process::run_shell;
use crate::types::{Language, TaskContext};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Lines of stdout kept when no report exists
const STDOUT_TAIL: usize = 20;

pub const MAVEN_TIMEOUT_MESSAGE: &str = "The \"mvn test\" command exceeded the time limit.";
pub const PYTEST_FAILED_MESSAGE: &str = "The \"pytest\" command run failed.";

#[async_trait]
pub trait TestRunner: Send + Sync {
    /// Run the task's test target against the file currently on disk
    async fn run(&self, ctx: &TaskContext) -> Result<TestReport>;
}

/// Runner matching the task language
pub fn runner_for(language: Language, pipeline: &PipelineConfig) -> Box<dyn TestRunner> {
    match language {
        Language::Java => Box::new(MavenRunner::new(pipeline.maven_timeout())),
        Language::Python => Box::new(PytestRunner::new(pipeline.pytest_timeout())),
    }
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    if tokio::fs::metadata(path).await.is_ok() {
        if path.is_dir() {
            tokio::fs::remove_dir_all(path).await?;
        } else {
            tokio::fs::remove_file(path).await?;
        }
    }
    Ok(())
}

/// Surefire run through offline Maven
pub struct MavenRunner {
    timeout: Duration,
}

impl MavenRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn command(test_target: &str) -> String {
        format!(
            "mvn compiler:testCompile surefire:test -o -q \
             -Dgpg.skip -DskipITs -Dinvoker.skip=true -Dspotless.skip=true \
             -Danimal.sniffer.skip=true -Dlicense.skip=true -Dtest=\"{}\"",
            test_target
        )
    }
}

#[async_trait]
impl TestRunner for MavenRunner {
    async fn run(&self, ctx: &TaskContext) -> Result<TestReport> {
        let module = ctx.runner_dir();
        let reports = module.join("target/surefire-reports");
        remove_if_exists(&reports).await?;

        let output = run_shell(&Self::command(&ctx.test_target), &module, self.timeout).await?;
        if output.timed_out {
            warn!(target = %ctx.test_target, "maven test run timed out");
            return Ok(TestReport::unparsed(MAVEN_TIMEOUT_MESSAGE));
        }

        let report_file = reports.join(format!("TEST-{}.xml", ctx.test_class));
        match tokio::fs::read_to_string(&report_file).await {
            Ok(xml) => Ok(summarize_surefire(&xml)
                .unwrap_or_else(|_| TestReport::unparsed(last_lines(&output.stdout, STDOUT_TAIL)))),
            Err(_) => {
                debug!(report = %report_file.display(), "no surefire report written");
                Ok(TestReport::unparsed(last_lines(&output.stdout, STDOUT_TAIL)))
            }
        }
    }
}

/// pytest run inside the repository's virtualenv
pub struct PytestRunner {
    timeout: Duration,
}

impl PytestRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn command(test_target: &str) -> String {
        format!(
            "source .venv/bin/activate\npytest {} --junitxml=results.xml\n",
            test_target
        )
    }
}

#[async_trait]
impl TestRunner for PytestRunner {
    async fn run(&self, ctx: &TaskContext) -> Result<TestReport> {
        let report_file = ctx.repo_path.join("results.xml");
        remove_if_exists(&report_file).await?;

        let output = match run_shell(&Self::command(&ctx.test_target), &ctx.repo_path, self.timeout).await {
            Ok(output) => output,
            Err(e) => {
                warn!(error = %e, "pytest could not be started");
                return Ok(TestReport::unparsed(PYTEST_FAILED_MESSAGE));
            }
        };

        match tokio::fs::read_to_string(&report_file).await {
            Ok(xml) => Ok(summarize_pytest(&xml).unwrap_or_else(|_| TestReport::unparsed(""))),
            Err(_) if output.timed_out => {
                warn!(target = %ctx.test_target, "pytest run timed out");
                Ok(TestReport::unparsed(PYTEST_FAILED_MESSAGE))
            }
            Err(_) => Ok(TestReport::unparsed(last_lines(&output.stdout, STDOUT_TAIL))),
        }
    }
}
