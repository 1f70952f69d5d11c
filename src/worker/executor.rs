use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use rand::Rng;
use tokio::process::Command;
use uuid::Uuid;

use crate::config::ExecutorConfig;
use crate::scheduler::{JobRecord, Outcome};

/// Result of one test execution
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub job_id: Uuid,
    pub outcome: Outcome,
    pub exit_code: Option<i32>,
    pub output: Option<String>,
    pub error: Option<String>,
}

impl ExecutionResult {
    fn simulated(job_id: Uuid, outcome: Outcome) -> Self {
        Self {
            job_id,
            outcome,
            exit_code: None,
            output: None,
            error: None,
        }
    }
}

/// Runs a claimed test and produces a verdict.
///
/// Execution never fails as such: anything that goes wrong while running
/// the test is a failed verdict.
pub trait TestExecutor: Send + Sync {
    fn execute(&self, job: &JobRecord) -> impl Future<Output = ExecutionResult> + Send;
}

/// Executor selected by [`ExecutorConfig`].
#[derive(Debug, Clone)]
pub struct JobExecutor {
    config: ExecutorConfig,
}

impl JobExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    async fn simulate(&self, job: &JobRecord, duration: Duration, pass_rate: f64) -> ExecutionResult {
        tokio::time::sleep(duration).await;
        let passed = rand::thread_rng().gen_bool(pass_rate.clamp(0.0, 1.0));
        let outcome = if passed {
            Outcome::Passed
        } else {
            Outcome::Failed
        };
        tracing::info!(job_id = %job.id, outcome = %outcome, "Simulated test finished");
        ExecutionResult::simulated(job.id, outcome)
    }

    async fn run_command(&self, job: &JobRecord, command: &str) -> ExecutionResult {
        let script = format!("{} {}", command, shell_quote(&job.test_path));
        tracing::info!(job_id = %job.id, script = %script, target = %job.target, "Executing test");

        let result = Command::new("sh")
            .arg("-c")
            .arg(&script)
            .env("TESTQ_JOB_ID", job.id.to_string())
            .env("TESTQ_ORG_ID", &job.org_id)
            .env("TESTQ_APP_VERSION_ID", &job.app_version_id)
            .env("TESTQ_TARGET", job.target.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        Self::process_output(job.id, result)
    }

    fn process_output(
        job_id: Uuid,
        result: Result<std::process::Output, std::io::Error>,
    ) -> ExecutionResult {
        match result {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                let exit_code = output.status.code();

                let (outcome, error) = if output.status.success() {
                    (Outcome::Passed, None)
                } else {
                    (
                        Outcome::Failed,
                        Some(if stderr.is_empty() {
                            format!("Exit code: {:?}", exit_code)
                        } else {
                            stderr
                        }),
                    )
                };

                tracing::info!(
                    job_id = %job_id,
                    outcome = %outcome,
                    exit_code = ?exit_code,
                    "Test finished"
                );

                ExecutionResult {
                    job_id,
                    outcome,
                    exit_code,
                    output: if stdout.is_empty() {
                        None
                    } else {
                        Some(stdout)
                    },
                    error,
                }
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Test could not be started");
                ExecutionResult {
                    job_id,
                    outcome: Outcome::Failed,
                    exit_code: None,
                    output: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

impl TestExecutor for JobExecutor {
    async fn execute(&self, job: &JobRecord) -> ExecutionResult {
        match &self.config {
            ExecutorConfig::Simulated {
                duration,
                pass_rate,
            } => self.simulate(job, *duration, *pass_rate).await,
            ExecutorConfig::Command { command } => self.run_command(job, command).await,
        }
    }
}

/// Single-quote a value for `sh -c`.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("tests/a.spec.ts"), "'tests/a.spec.ts'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }
}
