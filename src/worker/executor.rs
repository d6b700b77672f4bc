use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::scheduler::{HandlerError, JobContext, JobHandler};

/// Result of one shell execution.
#[derive(Debug)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: Option<String>,
    pub error: Option<String>,
}

/// Job handler that runs a shell command taken from the job payload.
///
/// The payload is expected to carry `{"command": "..."}`. Registered by
/// the node binary as the built-in `shell` job type.
#[derive(Debug, Clone, Default)]
pub struct ShellExecutor;

impl ShellExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Run `command` via `sh -c` and capture its output.
    pub async fn execute(&self, job_id: &str, command: &str) -> ExecutionResult {
        tracing::info!(job_id, command, "Executing shell job");

        let result = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        match result {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();

                let (success, error) = if output.status.success() {
                    (true, None)
                } else {
                    (
                        false,
                        Some(if stderr.is_empty() {
                            format!("Exit code: {:?}", output.status.code())
                        } else {
                            stderr
                        }),
                    )
                };

                tracing::info!(
                    job_id,
                    success,
                    exit_code = ?output.status.code(),
                    "Shell job finished"
                );

                ExecutionResult {
                    success,
                    output: if stdout.is_empty() { None } else { Some(stdout) },
                    error,
                }
            }
            Err(err) => {
                tracing::error!(job_id, error = %err, "Shell job failed to spawn");
                ExecutionResult {
                    success: false,
                    output: None,
                    error: Some(err.to_string()),
                }
            }
        }
    }
}

#[async_trait]
impl JobHandler for ShellExecutor {
    async fn run(&self, job: JobContext) -> std::result::Result<(), HandlerError> {
        let command = job
            .job
            .data
            .get("command")
            .and_then(|value| value.as_str())
            .ok_or("shell job payload is missing \"command\"")?;

        let result = self.execute(&job.job.id, command).await;
        if result.success {
            Ok(())
        } else {
            Err(result
                .error
                .unwrap_or_else(|| "shell command failed".to_string())
                .into())
        }
    }
}
