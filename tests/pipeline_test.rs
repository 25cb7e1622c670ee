//! End-to-end runs of the assertion pipeline against a scripted model

mod common;

use assertagent::config::{Config, PipelineConfig};
use assertagent::models::ScriptedModel;
use assertagent::pipeline::{load_dataset, run_task, BatchRunner, TaskResult};
use assertagent::telemetry::ResourceLog;
use assertagent::types::{ChatMessage, Language};
use common::{scripted, settings, tools, ORIGINAL};
use std::sync::Arc;
use tempfile::TempDir;

fn pipeline(nums: usize, max_tries: usize) -> PipelineConfig {
    PipelineConfig {
        nums,
        max_tries,
        ..PipelineConfig::default()
    }
}

#[tokio::test]
async fn test_accepted_candidate_and_file_restored() {
    let dir = TempDir::new().unwrap();
    let log = ResourceLog::in_memory();
    let tools = tools(&dir, pipeline(1, 1), log.clone());
    let path = tools.context().test_file_path();
    let model = scripted(vec!["assert x == 1"], 0);

    let out = run_task(tools, &settings(model.clone(), log.clone()), &pipeline(1, 1), vec![])
        .await
        .unwrap();

    assert_eq!(out, vec!["assert x == 1".to_string()]);
    assert_eq!(model.call_count(), 2);
    assert_eq!(log.stats().llm_calls, 2);
    assert_eq!(std::fs::read_to_string(path).unwrap(), ORIGINAL);
}

#[tokio::test]
async fn test_second_cycle_is_told_to_differ() {
    let dir = TempDir::new().unwrap();
    let log = ResourceLog::in_memory();
    let tools = tools(&dir, pipeline(2, 5), log.clone());
    let model = scripted(vec!["assert x == 1", "assert x > 0"], 0);

    let out = run_task(tools, &settings(model.clone(), log), &pipeline(2, 5), vec![])
        .await
        .unwrap();
    assert_eq!(out, vec!["assert x == 1".to_string(), "assert x > 0".to_string()]);

    // writer, reviewer, writer, reviewer
    let requests = model.requests();
    assert_eq!(requests.len(), 4);
    let second_brief = requests[2]
        .messages
        .iter()
        .find_map(|m| match m {
            ChatMessage::User { content } => Some(content.clone()),
            _ => None,
        })
        .unwrap();
    assert!(second_brief.contains("**completely different**"));
    assert!(second_brief.contains("```python\nassert x == 1\n```"));
}

#[tokio::test]
async fn test_repeated_candidate_is_kept_and_run_ends_at_max_tries() {
    let dir = TempDir::new().unwrap();
    let log = ResourceLog::in_memory();
    let config = pipeline(2, 2);
    let tools = tools(&dir, config.clone(), log.clone());
    let model = scripted(vec!["assert x == 1"], 0);

    let out = run_task(tools, &settings(model.clone(), log), &config, vec![])
        .await
        .unwrap();
    assert_eq!(out, vec!["assert x == 1".to_string(), "assert x == 1".to_string()]);

    let requests = model.requests();
    assert_eq!(requests.len(), 4);
    let second_brief = requests[2]
        .messages
        .iter()
        .find_map(|m| match m {
            ChatMessage::User { content } => Some(content.clone()),
            _ => None,
        })
        .unwrap();
    assert!(second_brief.contains("**completely different**"));
    assert!(second_brief.contains("```python\nassert x == 1\n```"));
}

#[tokio::test]
async fn test_review_rounds_are_bounded() {
    let dir = TempDir::new().unwrap();
    let log = ResourceLog::in_memory();
    let config = pipeline(1, 1);
    let tools = tools(&dir, config.clone(), log.clone());
    let model = scripted(vec!["assert x == 1"], usize::MAX);

    let out = run_task(tools, &settings(model.clone(), log), &config, vec![])
        .await
        .unwrap();

    // the last proposal is accepted once the reviewer budget is spent
    assert_eq!(out, vec!["assert x == 1".to_string()]);
    let reviewer_calls = model
        .requests()
        .iter()
        .filter(|r| common::is_reviewer(&r.messages))
        .count();
    assert_eq!(reviewer_calls, config.max_reviews);
    assert_eq!(model.call_count(), 2 * config.max_reviews + 1);
}

#[tokio::test]
async fn test_duplicate_candidate_is_reported_to_reviewer() {
    let dir = TempDir::new().unwrap();
    let log = ResourceLog::in_memory();
    let config = pipeline(1, 1);
    let tools = tools(&dir, config.clone(), log.clone());
    let model = scripted(vec!["assert x >= 0", "assert x == 1"], 1);

    let out = run_task(tools, &settings(model.clone(), log), &config, vec![])
        .await
        .unwrap();
    assert_eq!(out, vec!["assert x == 1".to_string()]);

    let first_review = model
        .requests()
        .into_iter()
        .find(|r| common::is_reviewer(&r.messages))
        .unwrap();
    let briefing = first_review.messages.iter().any(|m| match m {
        ChatMessage::User { content } => content.contains("duplicate check with the assert statement on line 5"),
        _ => false,
    });
    assert!(briefing);
}

#[tokio::test]
async fn test_batch_writes_results_and_resumes() {
    let dir = TempDir::new().unwrap();
    common::task(&dir);
    let dataset = dir.path().join("data.jsonl");
    std::fs::write(&dataset, format!("{}\n", serde_json::to_string(&common::record()).unwrap())).unwrap();

    let mut config = Config::default();
    config.paths = common::paths(&dir);
    config.pipeline = pipeline(1, 1);
    let records = load_dataset(&dataset).unwrap();

    let model: Arc<ScriptedModel> = scripted(vec!["assert x == 1"], 0);
    let summary = BatchRunner::new(config.clone(), Language::Python, model.clone())
        .run(records.clone(), 0..1)
        .await
        .unwrap();
    assert_eq!(summary.generated, 1);
    assert_eq!(summary.candidates, 1);
    assert!(summary.failed.is_empty());
    assert_eq!(summary.resources.llm_calls, 2);

    let saved: TaskResult =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("results/0.json")).unwrap()).unwrap();
    assert_eq!(saved.ground_truth_oracle, "assert x == 1");
    assert_eq!(saved.candidates(), vec!["assert x == 1".to_string()]);

    let resource_lines = std::fs::read_to_string(dir.path().join("resources/0.jsonl")).unwrap();
    assert_eq!(resource_lines.lines().count(), 2);
    assert!(resource_lines.lines().all(|l| l.contains("\"type\":\"llm\"")));
    assert_eq!(
        std::fs::read_to_string(dir.path().join("calc/tests/test_calc.py")).unwrap(),
        ORIGINAL
    );

    // a rerun finds enough candidates and skips the task
    let summary = BatchRunner::new(config, Language::Python, model.clone())
        .run(records, 0..1)
        .await
        .unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(model.call_count(), 2);
}
