//! Resource accounting for one task
//!
//! Every model call and every real test execution is appended to a JSONL
//! file as it happens, tagged with the generation id of the current cycle.
//! Running totals are kept in memory for the end-of-run summary.

use crate::models::Usage;
use crate::types::ChatMessage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;
use uuid::Uuid;

/// One line of the resource log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ResourceRecord {
    Llm {
        gen_id: String,
        agent: String,
        iters: usize,
        usage: Usage,
        messages: Vec<ChatMessage>,
        seconds: f64,
        timestamp: DateTime<Utc>,
    },
    Test {
        gen_id: String,
        seconds: f64,
        timestamp: DateTime<Utc>,
    },
}

/// Totals over all records
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResourceStats {
    pub llm_calls: usize,
    pub usage: Usage,
    pub llm_seconds: f64,
    pub test_runs: usize,
    pub test_seconds: f64,
}

impl ResourceStats {
    pub fn merge(&mut self, other: &ResourceStats) {
        self.llm_calls += other.llm_calls;
        self.usage += other.usage;
        self.llm_seconds += other.llm_seconds;
        self.test_runs += other.test_runs;
        self.test_seconds += other.test_seconds;
    }
}

#[derive(Debug, Default)]
struct LogState {
    gen_id: String,
    stats: ResourceStats,
}

/// Append-only resource log, cheap to clone and share between agents
#[derive(Debug, Clone)]
pub struct ResourceLog {
    path: Option<PathBuf>,
    state: Arc<Mutex<LogState>>,
}

impl ResourceLog {
    /// Log backed by a JSONL file; parent directories are created
    pub fn to_file(path: &Path) -> crate::errors::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path: Some(path.to_path_buf()),
            state: Arc::new(Mutex::new(LogState::default())),
        })
    }

    /// Log that only keeps totals
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Arc::new(Mutex::new(LogState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start a new cycle and return its generation id
    pub fn begin_generation(&self) -> String {
        let id = Uuid::new_v4().to_string();
        self.lock().gen_id = id.clone();
        id
    }

    pub fn generation(&self) -> String {
        self.lock().gen_id.clone()
    }

    pub fn record_llm(&self, agent: &str, iters: usize, usage: Usage, messages: &[ChatMessage], seconds: f64) {
        let record = {
            let mut state = self.lock();
            state.stats.llm_calls += 1;
            state.stats.usage += usage;
            state.stats.llm_seconds += seconds;
            ResourceRecord::Llm {
                gen_id: state.gen_id.clone(),
                agent: agent.to_string(),
                iters,
                usage,
                messages: messages.to_vec(),
                seconds,
                timestamp: Utc::now(),
            }
        };
        self.append(&record);
    }

    pub fn record_test(&self, seconds: f64) {
        let record = {
            let mut state = self.lock();
            state.stats.test_runs += 1;
            state.stats.test_seconds += seconds;
            ResourceRecord::Test {
                gen_id: state.gen_id.clone(),
                seconds,
                timestamp: Utc::now(),
            }
        };
        self.append(&record);
    }

    fn append(&self, record: &ResourceRecord) {
        let Some(path) = &self.path else {
            return;
        };

        let line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to serialize resource record");
                return;
            }
        };
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| writeln!(file, "{}", line));
        if let Err(e) = written {
            warn!(error = %e, path = %path.display(), "failed to append resource record");
        }
    }

    pub fn stats(&self) -> ResourceStats {
        self.lock().stats.clone()
    }
}

impl Default for ResourceLog {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_records_are_appended_as_jsonl() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("resources").join("3.jsonl");
        let log = ResourceLog::to_file(&path).unwrap();

        let gen_id = log.begin_generation();
        log.record_llm(
            "AssertAgent",
            1,
            Usage { prompt_tokens: 100, completion_tokens: 20, total_tokens: 120 },
            &[ChatMessage::user("hi")],
            1.5,
        );
        log.record_test(4.0);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["type"], "llm");
        assert_eq!(lines[0]["agent"], "AssertAgent");
        assert_eq!(lines[0]["gen_id"], gen_id.as_str());
        assert_eq!(lines[0]["usage"]["total_tokens"], 120);
        assert_eq!(lines[1]["type"], "test");
        assert_eq!(lines[1]["seconds"], 4.0);
    }

    #[test]
    fn test_stats_accumulate() {
        let log = ResourceLog::in_memory();
        log.begin_generation();
        log.record_llm("ReviewAgent", 1, Usage { prompt_tokens: 5, completion_tokens: 5, total_tokens: 10 }, &[], 0.5);
        log.record_llm("ReviewAgent", 2, Usage { prompt_tokens: 5, completion_tokens: 5, total_tokens: 10 }, &[], 0.5);
        log.record_test(2.0);

        let stats = log.stats();
        assert_eq!(stats.llm_calls, 2);
        assert_eq!(stats.usage.total_tokens, 20);
        assert_eq!(stats.test_runs, 1);

        let mut total = ResourceStats::default();
        total.merge(&stats);
        total.merge(&stats);
        assert_eq!(total.llm_calls, 4);
    }

    #[test]
    fn test_generation_ids_differ() {
        let log = ResourceLog::in_memory();
        let a = log.begin_generation();
        let b = log.begin_generation();
        assert_ne!(a, b);
        assert_eq!(log.generation(), b);
    }
}
