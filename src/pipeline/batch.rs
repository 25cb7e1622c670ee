//! Batch runs over a dataset
//!
//! Tasks are loaded from a JSONL dataset and spread over a bounded worker
//! pool. Each task gets:
//!
//! - a result file `{output_dir}/{index}.json`, rewritten after the task
//! - a resource log `{resource_dir}/{index}.jsonl`
//! - a debug port of its own, `debug_port + slot`
//!
//! Tasks of the same repository never run at the same time, since they
//! share the checkout and its build directory.

use super::driver::run_task;
use crate::agent::EngineSettings;
use crate::config::Config;
use crate::errors::{AgentError, Result};
use crate::models::{ChatModel, SamplingParams};
use crate::project::ProjectTools;
use crate::telemetry::{ResourceLog, ResourceStats};
use crate::types::{Language, TaskContext, TaskRecord};
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// One generated assertion in a result file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedOracle {
    pub gen_oracle: String,
}

/// Content of `{output_dir}/{index}.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub index: usize,
    pub ground_truth_oracle: String,
    pub results: Vec<GeneratedOracle>,
}

impl TaskResult {
    pub fn candidates(&self) -> Vec<String> {
        self.results.iter().map(|r| r.gen_oracle.clone()).collect()
    }
}

/// How a single task ended
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// Already held enough candidates
    Skipped,
    Generated { candidates: usize },
    Failed(String),
}

/// Totals of a batch run
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub generated: usize,
    pub skipped: usize,
    pub failed: Vec<(usize, String)>,
    pub candidates: usize,
    pub resources: ResourceStats,
}

impl BatchSummary {
    fn record(&mut self, index: usize, outcome: TaskOutcome, stats: &ResourceStats) {
        match outcome {
            TaskOutcome::Skipped => self.skipped += 1,
            TaskOutcome::Generated { candidates } => {
                self.generated += 1;
                self.candidates += candidates;
            }
            TaskOutcome::Failed(reason) => self.failed.push((index, reason)),
        }
        self.resources.merge(stats);
    }
}

/// Read a JSONL dataset, skipping blank lines
pub fn load_dataset(path: &Path) -> Result<Vec<TaskRecord>> {
    let contents = std::fs::read_to_string(path)?;
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line)
                .map_err(|e| AgentError::ParseError(format!("{}:{}: {}", path.display(), n + 1, e)))
        })
        .collect()
}

/// Index range to run; an empty or inverted range means the whole dataset
pub fn task_range(start: usize, end: usize, len: usize) -> std::ops::Range<usize> {
    if start < end {
        start.min(len)..end.min(len)
    } else {
        0..len
    }
}

pub fn result_path(output_dir: &Path, index: usize) -> PathBuf {
    output_dir.join(format!("{}.json", index))
}

/// Candidates saved by an earlier run, empty when there is no result file
pub fn load_existing(output_dir: &Path, index: usize) -> Result<Vec<String>> {
    let path = result_path(output_dir, index);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = std::fs::read_to_string(&path)?;
    let result: TaskResult = serde_json::from_str(&contents)?;
    Ok(result.candidates())
}

fn save_result(output_dir: &Path, result: &TaskResult) -> Result<()> {
    std::fs::create_dir_all(output_dir)?;
    let payload = serde_json::to_string_pretty(result)?;
    std::fs::write(result_path(output_dir, result.index), payload)?;
    Ok(())
}

fn cache_key(index: usize) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default();
    format!("assertagent_{}_{}", index, now)
}

/// Runs dataset tasks on a bounded worker pool
pub struct BatchRunner {
    config: Config,
    language: Language,
    model: Arc<dyn ChatModel>,
    workers: usize,
    cancel: CancellationToken,
    progress: Option<ProgressBar>,
    repo_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl BatchRunner {
    pub fn new(config: Config, language: Language, model: Arc<dyn ChatModel>) -> Self {
        Self {
            config,
            language,
            model,
            workers: 1,
            cancel: CancellationToken::new(),
            progress: None,
            repo_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Run every task in `range`
    ///
    /// Per-task failures are collected in the summary. A test file that
    /// could not be restored stops the batch, since later tasks of that
    /// repository would run against a corrupted checkout.
    pub async fn run(self, records: Vec<TaskRecord>, range: std::ops::Range<usize>) -> Result<BatchSummary> {
        let runner = Arc::new(self);
        let semaphore = Arc::new(Semaphore::new(runner.workers));
        let base = runner.config.pipeline.debug_port;
        let ports: Arc<Mutex<Vec<u16>>> = Arc::new(Mutex::new(
            (0..runner.workers).rev().map(|slot| base.saturating_add(slot as u16)).collect(),
        ));

        let mut handles = Vec::new();
        for index in range {
            let Some(record) = records.get(index).cloned() else {
                break;
            };
            let runner = runner.clone();
            let semaphore = semaphore.clone();
            let ports = ports.clone();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| AgentError::Generic(format!("worker pool closed: {}", e)))?;
                let port = pop_port(&ports).unwrap_or(base);
                let result = runner.run_one(index, record, port).await;
                push_port(&ports, port);
                if result.is_err() {
                    runner.cancel.cancel();
                }
                if let Some(progress) = &runner.progress {
                    progress.inc(1);
                }
                result.map(|(outcome, stats)| (index, outcome, stats))
            }));
        }

        let mut summary = BatchSummary::default();
        let mut fatal = None;
        for joined in futures_util::future::join_all(handles).await {
            match joined {
                Ok(Ok((index, outcome, stats))) => summary.record(index, outcome, &stats),
                Ok(Err(e)) => {
                    error!(error = %e, "batch stopped");
                    fatal.get_or_insert(e);
                }
                Err(e) => {
                    fatal.get_or_insert(AgentError::Generic(format!("worker panicked: {}", e)));
                }
            }
        }

        if let Some(progress) = &runner.progress {
            progress.finish_and_clear();
        }
        match fatal {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    fn repo_lock(&self, repo: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.repo_locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(repo.to_string()).or_default().clone()
    }

    /// Generate and save candidates for one dataset row
    ///
    /// Only a failed restore is returned as an error.
    pub async fn run_one(&self, index: usize, record: TaskRecord, port: u16) -> Result<(TaskOutcome, ResourceStats)> {
        let paths = &self.config.paths;
        let pipeline = &self.config.pipeline;

        let existing = match load_existing(&paths.output_dir, index) {
            Ok(existing) => existing,
            Err(e) => {
                warn!(task = index, error = %e, "ignoring unreadable result file");
                Vec::new()
            }
        };
        if existing.len() >= pipeline.nums {
            info!(task = index, "Skip {}.", index);
            return Ok((TaskOutcome::Skipped, ResourceStats::default()));
        }
        if self.cancel.is_cancelled() {
            return Ok((TaskOutcome::Failed("cancelled".to_string()), ResourceStats::default()));
        }

        let ctx = match TaskContext::from_record(index, &record, self.language, paths) {
            Ok(ctx) => ctx,
            Err(e) => return Ok((TaskOutcome::Failed(e.to_string()), ResourceStats::default())),
        };
        let log = ResourceLog::to_file(&paths.resource_dir.join(format!("{}.jsonl", index)))?;

        let lock = self.repo_lock(&record.repo_name);
        let _guard = lock.lock().await;

        let tools = match ProjectTools::open(ctx, pipeline.clone(), port, log.clone()) {
            Ok(tools) => Arc::new(tools),
            Err(e) => return Ok((TaskOutcome::Failed(e.to_string()), log.stats())),
        };

        let sampling = SamplingParams::from_config(&self.config.model).with_cache_key(cache_key(index));
        let settings = EngineSettings::new(self.model.clone(), sampling, log.clone())
            .with_generation_mode(self.config.model.generation_mode)
            .with_max_tool_calls(pipeline.max_tool_calls)
            .with_cancel(self.cancel.child_token());

        let outcome = match run_task(tools, &settings, pipeline, existing).await {
            Ok(candidates) => {
                let result = TaskResult {
                    index,
                    ground_truth_oracle: record.ground_truth_oracle.clone(),
                    results: candidates
                        .iter()
                        .map(|c| GeneratedOracle { gen_oracle: c.clone() })
                        .collect(),
                };
                save_result(&paths.output_dir, &result)?;
                info!(task = index, candidates = candidates.len(), "task finished");
                TaskOutcome::Generated {
                    candidates: candidates.len(),
                }
            }
            Err(e @ AgentError::RestoreFailed { .. }) => return Err(e),
            Err(e) => {
                error!(task = index, error = %e, "task failed");
                TaskOutcome::Failed(e.to_string())
            }
        };
        Ok((outcome, log.stats()))
    }
}

fn pop_port(ports: &Mutex<Vec<u16>>) -> Option<u16> {
    ports.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).pop()
}

fn push_port(ports: &Mutex<Vec<u16>>, port: u16) {
    ports.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(port);
}
