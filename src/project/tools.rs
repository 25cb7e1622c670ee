//! Project tools: the single owner of the test file under completion
//!
//! `ProjectTools` masks the test file when opened and guarantees the
//! original content is back on disk after `close`. Everything that touches
//! the file or the debugger goes through it:
//!
//! - `static_check_assert`: syntax and adjacent-duplicate check, cached
//! - `run_test`: real test run with the candidate swapped in, cached
//! - `get_locals` / `get_debug_value` / `get_debug_values`: debugger queries
//!
//! Debugger access is serialized by one async mutex, so concurrent tool
//! calls from a single model turn never query the paused process at the
//! same time.

use super::masked::MaskedFile;
use super::report::TestReport;
use super::runner::{runner_for, TestRunner};
use super::static_check::check_assert;
use crate::config::PipelineConfig;
use crate::debugger::{debug_file_content, DebuggerSession};
use crate::errors::{AgentError, Result};
use crate::syntax::truncate_chars;
use crate::telemetry::ResourceLog;
use crate::tools::executor::ToolHandler;
use crate::tools::registry::{GET_DEBUG_VALUE, GET_DEBUG_VALUES, GET_LOCALS, RUN_TEST};
use crate::types::{CheckOutcome, TaskContext};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;
use tracing::{info, warn};

/// Longest debugger answer handed to the model
pub const MAX_DEBUG_OUTPUT: usize = 1024;

/// Outcome of one real test run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRun {
    pub passed: bool,
    pub message: String,
    /// Wall-clock cost; zero when served from the cache
    pub seconds: f64,
}

#[derive(Default)]
struct DebugState {
    session: Option<DebuggerSession>,
    locals: Option<String>,
    values: HashMap<String, String>,
}

pub struct ProjectTools {
    ctx: TaskContext,
    pipeline: PipelineConfig,
    port: u16,
    log: ResourceLog,
    runner: Box<dyn TestRunner>,

    masked: tokio::sync::Mutex<MaskedFile>,
    debug: tokio::sync::Mutex<DebugState>,
    debugger_failed: AtomicBool,

    check_cache: Mutex<HashMap<String, CheckOutcome>>,
    run_cache: Mutex<HashMap<String, TestRun>>,
    static_checks: AtomicUsize,
    test_runs: AtomicUsize,
}

impl ProjectTools {
    /// Mask the test file of `ctx` and take ownership of it
    pub fn open(ctx: TaskContext, pipeline: PipelineConfig, port: u16, log: ResourceLog) -> Result<Self> {
        let masked = MaskedFile::apply(&ctx.test_file_path(), &ctx.test_prefix, &ctx.placeholder)?;
        let runner = runner_for(ctx.language, &pipeline);
        info!(task = ctx.index, file = %masked.path().display(), "project tools opened");

        Ok(Self {
            ctx,
            pipeline,
            port,
            log,
            runner,
            masked: tokio::sync::Mutex::new(masked),
            debug: tokio::sync::Mutex::new(DebugState::default()),
            debugger_failed: AtomicBool::new(false),
            check_cache: Mutex::new(HashMap::new()),
            run_cache: Mutex::new(HashMap::new()),
            static_checks: AtomicUsize::new(0),
            test_runs: AtomicUsize::new(0),
        })
    }

    /// Replace the language default test runner
    pub fn with_runner(mut self, runner: Box<dyn TestRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn context(&self) -> &TaskContext {
        &self.ctx
    }

    /// Real test runs are part of verification
    pub fn dynamic_enabled(&self) -> bool {
        self.pipeline.with_dynamic && !self.debugger_failed.load(Ordering::SeqCst)
    }

    /// A locals snapshot goes into the writer prompt
    pub fn locals_enabled(&self) -> bool {
        self.pipeline.with_locals && !self.debugger_failed.load(Ordering::SeqCst)
    }

    pub fn static_check_count(&self) -> usize {
        self.static_checks.load(Ordering::SeqCst)
    }

    pub fn test_run_count(&self) -> usize {
        self.test_runs.load(Ordering::SeqCst)
    }

    pub fn static_check_assert(&self, assert_code: &str) -> CheckOutcome {
        if let Some(hit) = self.check_cache.lock().ok().and_then(|c| c.get(assert_code).cloned()) {
            return hit;
        }

        let outcome = check_assert(self.ctx.language, assert_code, &self.ctx.test_prefix, &self.ctx.placeholder);
        self.static_checks.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut cache) = self.check_cache.lock() {
            cache.insert(assert_code.to_string(), outcome.clone());
        }
        outcome
    }

    /// Run the test with `assert_code` in place of the placeholder
    ///
    /// Runner failures and timeouts come back as a failed run. Only file
    /// writes can make this return an error.
    pub async fn run_test(&self, assert_code: &str) -> Result<TestRun> {
        if let Some(hit) = self.cached_run(assert_code) {
            return Ok(hit);
        }

        let masked = self.masked.lock().await;
        masked.write_candidate(assert_code)?;

        let start = Instant::now();
        let outcome = self.runner.run(&self.ctx).await;
        let seconds = start.elapsed().as_secs_f64();
        let remasked = masked.remask();
        drop(masked);

        let report = outcome.unwrap_or_else(|e| {
            warn!(error = %e, "test runner failed");
            TestReport::unparsed(format!("The test run failed: {}", e))
        });
        remasked?;

        self.test_runs.fetch_add(1, Ordering::SeqCst);
        self.log.record_test(seconds);

        let passed = report.all_passed();
        info!(passed, seconds, "test run finished");
        if let Ok(mut cache) = self.run_cache.lock() {
            cache.insert(
                assert_code.to_string(),
                TestRun {
                    passed,
                    message: report.summary.clone(),
                    seconds: 0.0,
                },
            );
        }

        Ok(TestRun {
            passed,
            message: report.summary,
            seconds,
        })
    }

    /// Cached run result, without running anything
    pub fn cached_run(&self, assert_code: &str) -> Option<TestRun> {
        self.run_cache.lock().ok().and_then(|c| c.get(assert_code).cloned())
    }

    /// Start the debugger once; returns whether it is paused and usable
    ///
    /// A failed start disables dynamic features for the rest of the task.
    pub async fn start_debugger(&self) -> bool {
        let mut debug = self.debug.lock().await;
        self.ensure_session(&mut debug).await.is_ok()
    }

    async fn ensure_session<'a>(&self, debug: &'a mut DebugState) -> Result<&'a mut DebuggerSession> {
        if !self.pipeline.needs_debugger() {
            return Err(AgentError::ToolError(
                "The debugger is not enabled for this task.".to_string(),
            ));
        }
        if self.debugger_failed.load(Ordering::SeqCst) {
            return Err(AgentError::ToolError(
                "The debugger is not available for this test.".to_string(),
            ));
        }

        if debug.session.is_none() {
            let content = {
                let masked = self.masked.lock().await;
                debug_file_content(&self.ctx, masked.original(), masked.masked())?
            };
            let mut session = DebuggerSession::for_task(&self.ctx, &self.pipeline, self.port, content);
            if let Err(e) = session.start().await {
                warn!(task = self.ctx.index, error = %e, "debugger unavailable, continuing without dynamic features");
                self.debugger_failed.store(true, Ordering::SeqCst);
                return Err(AgentError::ToolError(format!("The debugger failed to start: {}", e)));
            }
            debug.session = Some(session);
        }

        debug
            .session
            .as_mut()
            .ok_or_else(|| AgentError::DebuggerError("debugger session missing".to_string()))
    }

    pub async fn get_locals(&self) -> Result<String> {
        let mut debug = self.debug.lock().await;
        if let Some(locals) = &debug.locals {
            return Ok(locals.clone());
        }
        let session = self.ensure_session(&mut debug).await?;
        let locals = bound_debug_output(session.locals().await?.trim(), session.caches_expressions());
        debug.locals = Some(locals.clone());
        Ok(locals)
    }

    pub async fn get_debug_value(&self, var_or_expr: &str) -> Result<String> {
        let mut debug = self.debug.lock().await;
        self.evaluate(&mut debug, var_or_expr.trim()).await
    }

    /// Evaluate a comma separated list, one answer per line
    pub async fn get_debug_values(&self, var_or_expr_list: &str) -> Result<String> {
        let mut debug = self.debug.lock().await;
        let mut answers = Vec::new();
        for expr in var_or_expr_list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            answers.push(self.evaluate(&mut debug, expr).await?);
        }
        Ok(answers.join("\n"))
    }

    async fn evaluate(&self, debug: &mut DebugState, expr: &str) -> Result<String> {
        if let Some(hit) = debug.values.get(expr) {
            return Ok(hit.clone());
        }
        let session = self.ensure_session(debug).await?;
        let value = session.evaluate(expr).await?.trim().to_string();
        let caches = session.caches_expressions();
        if caches {
            debug.values.insert(expr.to_string(), value.clone());
        }
        Ok(bound_debug_output(&value, caches))
    }

    pub async fn close_debugger(&self) {
        let mut debug = self.debug.lock().await;
        if let Some(mut session) = debug.session.take() {
            session.close().await;
        }
    }

    /// Close the debugger and put the original test file back
    ///
    /// Safe to call more than once.
    pub async fn close(&self) -> Result<()> {
        self.close_debugger().await;
        let mut masked = self.masked.lock().await;
        masked.restore()?;
        info!(task = self.ctx.index, "project tools closed, test file restored");
        Ok(())
    }
}

/// Debugger text handed to the model
///
/// Backends that re-query every expression (ipdb) are cut at
/// `MAX_DEBUG_OUTPUT` characters; caching backends (jdb) pass through whole.
fn bound_debug_output(text: &str, caches_expressions: bool) -> String {
    if caches_expressions {
        text.to_string()
    } else {
        truncate_chars(text, MAX_DEBUG_OUTPUT)
    }
}

fn required<'a>(args: &'a serde_json::Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| AgentError::ToolError(format!("Missing required argument `{}`", key)))
}

#[async_trait]
impl ToolHandler for ProjectTools {
    async fn call_tool(&self, name: &str, args: &serde_json::Value) -> Result<String> {
        match name {
            RUN_TEST => {
                let code = self.ctx.language.normalize_assert(required(args, "assert_code")?);
                let run = self.run_test(&code).await?;
                Ok(format!("Passed: {}\n{}", run.passed, run.message))
            }
            GET_LOCALS => self.get_locals().await,
            GET_DEBUG_VALUE => self.get_debug_value(required(args, "var_or_expr")?).await,
            GET_DEBUG_VALUES => self.get_debug_values(required(args, "var_or_expr_list")?).await,
            other => Err(AgentError::ToolError(format!("Unknown tool: {}", other))),
        }
    }
}
