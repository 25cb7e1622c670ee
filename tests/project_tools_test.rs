//! Project tools: masking, verification caches and restore

mod common;

use assertagent::config::PipelineConfig;
use assertagent::telemetry::ResourceLog;
use common::{tools, ORIGINAL};
use tempfile::TempDir;
use tokio_test::assert_ok;

#[tokio::test]
async fn test_file_is_masked_while_open_and_restored_on_close() {
    let dir = TempDir::new().unwrap();
    let tools = tools(&dir, PipelineConfig::default(), ResourceLog::in_memory());
    let path = tools.context().test_file_path();

    let masked = std::fs::read_to_string(&path).unwrap();
    assert!(masked.contains("... # <AssertPlaceHolder>"));
    assert!(!masked.contains("assert x == 1"));

    assert_ok!(tools.close().await);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), ORIGINAL);

    // closing again leaves the file alone
    assert_ok!(tools.close().await);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), ORIGINAL);
}

#[tokio::test]
async fn test_verification_results_are_cached() {
    let dir = TempDir::new().unwrap();
    let log = ResourceLog::in_memory();
    let tools = tools(&dir, PipelineConfig::default(), log.clone());
    let path = tools.context().test_file_path();

    assert!(tools.static_check_assert("assert x == 1").passed);
    assert!(tools.static_check_assert("assert x == 1").passed);
    assert_eq!(tools.static_check_count(), 1);

    let first = tools.run_test("assert x == 1").await.unwrap();
    let second = tools.run_test("assert x == 1").await.unwrap();
    assert!(first.passed);
    assert_eq!(second.passed, first.passed);
    assert_eq!(second.message, first.message);
    assert_eq!(second.seconds, 0.0);
    assert_eq!(tools.test_run_count(), 1);
    assert_eq!(log.stats().test_runs, 1);

    let failing = tools.run_test("assert x == 2").await.unwrap();
    assert!(!failing.passed);
    assert_eq!(tools.test_run_count(), 2);

    // the candidate never stays on disk after a run
    assert!(std::fs::read_to_string(&path).unwrap().contains("... # <AssertPlaceHolder>"));
    tools.close().await.unwrap();
}

#[tokio::test]
async fn test_adjacent_duplicate_fails_static_check() {
    let dir = TempDir::new().unwrap();
    let tools = tools(&dir, PipelineConfig::default(), ResourceLog::in_memory());

    let duplicate = tools.static_check_assert("assert x >= 0");
    assert!(!duplicate.passed);
    assert!(duplicate.message.ends_with("on line 5."));

    let broken = tools.static_check_assert("assert x ==");
    assert!(!broken.passed);
    assert!(broken.message.contains("syntax error"));
    tools.close().await.unwrap();
}

#[tokio::test]
async fn test_debugger_refused_without_dynamic_features() {
    let dir = TempDir::new().unwrap();
    let tools = tools(&dir, PipelineConfig::default(), ResourceLog::in_memory());

    assert!(!tools.start_debugger().await);
    let err = tools.get_locals().await.unwrap_err();
    assert!(err.to_string().contains("not enabled"));
    assert!(!tools.dynamic_enabled());
    tools.close().await.unwrap();
}
