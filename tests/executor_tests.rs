//! Shell executor tests.

use serde_json::json;

use chime::worker::ShellExecutor;
use chime::{create_worker_id, Job, JobContext, JobHandler};

fn shell_context(data: serde_json::Value) -> JobContext {
    JobContext {
        job: Job {
            id: "shell-1".to_string(),
            job_type: "shell".to_string(),
            schedule: None,
            priority: 0,
            concurrency: 1,
            data,
        },
        due: None,
        worker_id: create_worker_id(),
    }
}

#[tokio::test]
async fn test_execute_simple_command() {
    let executor = ShellExecutor::new();

    let result = executor.execute("j1", "echo hello").await;

    assert!(result.success);
    assert_eq!(result.output, Some("hello\n".to_string()));
    assert!(result.error.is_none());
}

#[tokio::test]
async fn test_execute_empty_output() {
    let executor = ShellExecutor::new();

    let result = executor.execute("j2", "true").await;

    assert!(result.success);
    assert!(result.output.is_none());
    assert!(result.error.is_none());
}

#[tokio::test]
async fn test_execute_command_failure() {
    let executor = ShellExecutor::new();

    let result = executor.execute("j3", "exit 3").await;

    assert!(!result.success);
    assert!(result.error.is_some());
    assert!(result.error.unwrap().contains('3'));
}

#[tokio::test]
async fn test_execute_captures_stderr_as_error() {
    let executor = ShellExecutor::new();

    let result = executor.execute("j4", "echo boom >&2; exit 1").await;

    assert!(!result.success);
    assert_eq!(result.error, Some("boom\n".to_string()));
}

#[tokio::test]
async fn test_handler_runs_command_from_payload() {
    let executor = ShellExecutor::new();

    let outcome = executor
        .run(shell_context(json!({"command": "true"})))
        .await;
    assert!(outcome.is_ok());
}

#[tokio::test]
async fn test_handler_rejects_missing_command() {
    let executor = ShellExecutor::new();

    let outcome = executor.run(shell_context(json!({}))).await;
    assert!(outcome.is_err());
}

#[tokio::test]
async fn test_handler_surfaces_command_failure() {
    let executor = ShellExecutor::new();

    let outcome = executor
        .run(shell_context(json!({"command": "exit 1"})))
        .await;
    assert!(outcome.is_err());
}
