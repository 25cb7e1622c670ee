//! Shared fixtures for integration tests
#![allow(dead_code)]

use assertagent::agent::EngineSettings;
use assertagent::config::{PathsConfig, PipelineConfig};
use assertagent::models::{ModelResponse, SamplingParams, ScriptedModel};
use assertagent::project::{ProjectTools, TestReport, TestRunner};
use assertagent::telemetry::ResourceLog;
use assertagent::tools::RetryManager;
use assertagent::types::{ChatMessage, Language, TaskContext, TaskRecord};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

pub const ORIGINAL: &str = "from calc.ops import add\n\ndef test_add():\n    x = add(1, 0)\n    assert x >= 0\n    assert x == 1\n";

/// Passes when the test file holds `assert x == 1`
pub struct StubRunner;

#[async_trait]
impl TestRunner for StubRunner {
    async fn run(&self, ctx: &TaskContext) -> assertagent::Result<TestReport> {
        let on_disk = std::fs::read_to_string(ctx.test_file_path())?;
        let score = if on_disk.contains("assert x == 1") { 1.0 } else { 0.0 };
        Ok(TestReport {
            score,
            passed: score as usize,
            total: 1,
            summary: format!("Total 1, Passed: {}\nPass Rate: {}", score as usize, score),
        })
    }
}

pub fn record() -> TaskRecord {
    serde_json::from_value(serde_json::json!({
        "repo_name": "calc",
        "test_target": "tests/test_calc.py::test_add",
        "focal_method": "def add(a, b):\n    return a + b",
        "focal_method_file_path": "calc/ops.py",
        "focal_method_start_lineno": 1,
        "focal_method_end_lineno": 2,
        "test_setup": "",
        "test_setup_file_path": "",
        "test_prefix": "def test_add():\n    x = add(1, 0)\n    assert x >= 0\n    <AssertPlaceHolder>",
        "test_prefix_file_path": "tests/test_calc.py",
        "test_prefix_start_lineno": 3,
        "test_prefix_end_lineno": 6,
        "ground_truth_oracle": "assert x == 1"
    }))
    .unwrap()
}

pub fn paths(dir: &TempDir) -> PathsConfig {
    PathsConfig {
        repo_cache_dir: dir.path().to_path_buf(),
        debug_cache_dir: dir.path().join("debug"),
        calls_extract_dir: dir.path().join("calls"),
        agent_cache_dir: dir.path().join("agents"),
        output_dir: dir.path().join("results"),
        resource_dir: dir.path().join("resources"),
    }
}

/// Write the `calc` checkout into `dir` and build its task
pub fn task(dir: &TempDir) -> TaskContext {
    let repo = dir.path().join("calc");
    std::fs::create_dir_all(repo.join("tests")).unwrap();
    std::fs::create_dir_all(repo.join("calc")).unwrap();
    std::fs::write(repo.join("tests/test_calc.py"), ORIGINAL).unwrap();
    std::fs::write(repo.join("calc/ops.py"), "def add(a, b):\n    return a + b\n").unwrap();
    TaskContext::from_record(0, &record(), Language::Python, &paths(dir)).unwrap()
}

pub fn tools(dir: &TempDir, pipeline: PipelineConfig, log: ResourceLog) -> Arc<ProjectTools> {
    Arc::new(
        ProjectTools::open(task(dir), pipeline, 6001, log)
            .unwrap()
            .with_runner(Box::new(StubRunner)),
    )
}

pub fn settings(model: Arc<ScriptedModel>, log: ResourceLog) -> EngineSettings {
    EngineSettings::new(model, SamplingParams::default(), log).with_retry(RetryManager::with_config(2, 1, 2))
}

pub fn answer(code: &str) -> String {
    format!("```json\n{{\"assert_code\": \"{}\"}}\n```", code)
}

pub fn is_reviewer(messages: &[ChatMessage]) -> bool {
    matches!(
        messages.first(),
        Some(ChatMessage::System { content }) if content.contains("software reviewer")
    )
}

/// Writer answers from `writes` in turn (the last one repeats); the
/// reviewer rejects the first `rejections` verdicts and accepts afterwards
pub fn scripted(writes: Vec<&'static str>, rejections: usize) -> Arc<ScriptedModel> {
    let written = AtomicUsize::new(0);
    let reviewed = AtomicUsize::new(0);
    Arc::new(ScriptedModel::from_fn(move |messages, _| {
        if is_reviewer(messages) {
            let n = reviewed.fetch_add(1, Ordering::SeqCst);
            return Ok(ModelResponse::text(format!(
                "```json\n{{\"decision\": {}, \"suggestions\": \"Compare with the exact value.\"}}\n```",
                n >= rejections
            )));
        }
        let n = written.fetch_add(1, Ordering::SeqCst);
        let code = writes[n.min(writes.len() - 1)];
        Ok(ModelResponse::text(answer(code)))
    }))
}
