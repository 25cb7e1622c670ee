//! Fixtures shared by unit tests

use crate::config::{PathsConfig, PipelineConfig};
use crate::errors::Result;
use crate::project::{ProjectTools, TestReport, TestRunner};
use crate::telemetry::ResourceLog;
use crate::types::{Language, TaskContext, TaskRecord};
use async_trait::async_trait;
use tempfile::TempDir;

pub const ORIGINAL: &str = "from calc.ops import add\n\ndef test_add():\n    x = add(1, 0)\n    assert x == 1\n";

/// Writer answer for the fixture task
pub const ANSWER: &str = "```json\n{\"assert_code\": \"assert x == 1\"}\n```";

/// Passes when the test file holds `assert x == 1`
pub struct StubRunner;

#[async_trait]
impl TestRunner for StubRunner {
    async fn run(&self, ctx: &TaskContext) -> Result<TestReport> {
        let on_disk = std::fs::read_to_string(ctx.test_file_path())?;
        let score = if on_disk.contains("assert x == 1") { 1.0 } else { 0.0 };
        Ok(TestReport {
            score,
            passed: score as usize,
            total: 1,
            summary: format!("Pass Rate: {}", score),
        })
    }
}

pub fn python_record() -> TaskRecord {
    TaskRecord {
        repo_name: "calc".into(),
        test_target: "tests/test_calc.py::test_add".into(),
        focal_method: "def add(a, b):\n    return a + b".into(),
        focal_method_file_path: "calc/ops.py".into(),
        focal_method_start_lineno: 1,
        focal_method_end_lineno: 2,
        test_setup: String::new(),
        test_setup_file_path: String::new(),
        test_setup_start_lineno: None,
        test_setup_end_lineno: None,
        test_setup_list: vec![],
        test_prefix: "def test_add():\n    x = add(1, 0)\n    <AssertPlaceHolder>".into(),
        test_prefix_file_path: "tests/test_calc.py".into(),
        test_prefix_start_lineno: 3,
        test_prefix_end_lineno: 5,
        ground_truth_oracle: "assert x == 1".into(),
        ground_truth_oracle_lineno: None,
    }
}

/// Task over a throwaway `calc` checkout inside `dir`
pub fn python_task(dir: &TempDir) -> TaskContext {
    let repo = dir.path().join("calc");
    std::fs::create_dir_all(repo.join("tests")).unwrap();
    std::fs::create_dir_all(repo.join("calc")).unwrap();
    std::fs::write(repo.join("tests/test_calc.py"), ORIGINAL).unwrap();
    std::fs::write(repo.join("calc/ops.py"), "def add(a, b):\n    return a + b\n").unwrap();

    let paths = PathsConfig {
        repo_cache_dir: dir.path().to_path_buf(),
        debug_cache_dir: dir.path().join("debug"),
        calls_extract_dir: dir.path().join("calls"),
        agent_cache_dir: dir.path().join("agents"),
        ..PathsConfig::default()
    };
    TaskContext::from_record(0, &python_record(), Language::Python, &paths).unwrap()
}

pub fn python_tools_with(dir: &TempDir, pipeline: PipelineConfig) -> ProjectTools {
    ProjectTools::open(python_task(dir), pipeline, 6001, ResourceLog::in_memory())
        .unwrap()
        .with_runner(Box::new(StubRunner))
}

pub fn python_tools(dir: &TempDir) -> ProjectTools {
    python_tools_with(dir, PipelineConfig::default())
}
