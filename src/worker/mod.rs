//! Worker side of the queue.
//!
//! A worker polls the dispatch service for work, runs each claimed test and
//! reports the verdict:
//!
//! 1. Claim the next job ([`DispatchApi::claim`])
//! 2. On "none available", count an idle cycle and sleep; stop after
//!    `max_idle_cycles` consecutive idle cycles
//! 3. Run the test through a [`TestExecutor`]
//! 4. Report the verdict once ([`DispatchApi::complete`])
//!
//! Failures to reach the server are handled here with backoff and never
//! touch job state. Failed tests are the server's business: its retry
//! policy decides whether the job is re-queued.

pub mod executor;

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::client::DispatchClient;
use crate::config::{ClientConfig, WorkerConfig};
use crate::error::Result;
use crate::scheduler::{Completion, Dispatcher, JobRecord, Outcome};

pub use executor::{ExecutionResult, JobExecutor, TestExecutor};

/// The two dispatch operations a worker needs.
pub trait DispatchApi: Send + Sync {
    /// Claim the next job; `Ok(None)` when nothing is queued.
    fn claim(&self, worker_id: &str) -> impl Future<Output = Result<Option<JobRecord>>> + Send;

    fn complete(&self, job_id: Uuid, outcome: Outcome) -> impl Future<Output = Result<Completion>> + Send;
}

impl DispatchApi for Dispatcher {
    async fn claim(&self, worker_id: &str) -> Result<Option<JobRecord>> {
        Ok(Dispatcher::claim(self, Some(worker_id)).await)
    }

    async fn complete(&self, job_id: Uuid, outcome: Outcome) -> Result<Completion> {
        Dispatcher::complete(self, &job_id, outcome).await
    }
}

impl DispatchApi for DispatchClient {
    async fn claim(&self, worker_id: &str) -> Result<Option<JobRecord>> {
        DispatchClient::claim(self, Some(worker_id)).await
    }

    async fn complete(&self, job_id: Uuid, outcome: Outcome) -> Result<Completion> {
        DispatchClient::complete(self, &job_id, outcome)
            .await
            .map(|response| response.completion)
    }
}

/// What a worker did before it stopped.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSummary {
    pub executed: u32,
    pub passed: u32,
    /// Failed executions the server re-queued.
    pub retried: u32,
    /// Failed executions that exhausted the job's retries.
    pub failed: u32,
    /// Executions whose verdict never got accepted by the server.
    pub unreported: u32,
}

pub struct Worker<D, E> {
    config: WorkerConfig,
    dispatch: D,
    executor: E,
}

impl<E: TestExecutor> Worker<DispatchClient, E> {
    /// A worker talking to the dispatch server at `config.server_url`.
    pub fn connect(config: WorkerConfig, executor: E) -> Result<Self> {
        let dispatch = DispatchClient::new(ClientConfig::new(config.server_url.clone()))?;
        Ok(Self::new(config, dispatch, executor))
    }
}

impl<D: DispatchApi, E: TestExecutor> Worker<D, E> {
    pub fn new(config: WorkerConfig, dispatch: D, executor: E) -> Self {
        Self {
            config,
            dispatch,
            executor,
        }
    }

    /// Poll for and run jobs until the idle limit is reached or `shutdown`
    /// is cancelled. A job already claimed is always run and reported
    /// before the loop checks for shutdown again.
    ///
    /// # Errors
    ///
    /// Returns the last error once `max_transport_failures` consecutive
    /// claims could not reach the server.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<WorkerSummary> {
        let worker_id = self.config.worker_id.as_str();
        let max_idle_cycles = self.config.max_idle_cycles;
        let mut summary = WorkerSummary::default();
        let mut idle_cycles = 0;
        let mut transport_failures = 0;

        tracing::info!(worker_id, "Worker started, polling for jobs");

        while idle_cycles < max_idle_cycles && !shutdown.is_cancelled() {
            match self.dispatch.claim(worker_id).await {
                Ok(Some(job)) => {
                    idle_cycles = 0;
                    transport_failures = 0;
                    self.process(job, &mut summary).await;
                }
                Ok(None) => {
                    idle_cycles += 1;
                    transport_failures = 0;
                    tracing::info!(worker_id, idle_cycles, max_idle_cycles, "No jobs available");
                    if idle_cycles < max_idle_cycles {
                        self.pause(self.config.poll_interval, &shutdown).await;
                    }
                }
                Err(e) if e.is_transport() => {
                    transport_failures += 1;
                    tracing::warn!(
                        worker_id,
                        error = %e,
                        transport_failures,
                        "Could not reach dispatch server"
                    );
                    if transport_failures >= self.config.max_transport_failures {
                        return Err(e);
                    }
                    self.pause(self.config.transport_backoff, &shutdown).await;
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            worker_id,
            executed = summary.executed,
            passed = summary.passed,
            retried = summary.retried,
            failed = summary.failed,
            unreported = summary.unreported,
            "Worker shutting down"
        );
        Ok(summary)
    }

    async fn process(&self, job: JobRecord, summary: &mut WorkerSummary) {
        tracing::info!(
            job_id = %job.id,
            test_path = %job.test_path,
            target = %job.target,
            attempt = job.retries + 1,
            "Running job"
        );

        let result = self.executor.execute(&job).await;
        summary.executed += 1;
        if let Some(error) = &result.error {
            tracing::debug!(job_id = %job.id, error = %error, "Test output on failure");
        }

        match self.report(job.id, result.outcome).await {
            Some(Completion::Passed) => summary.passed += 1,
            Some(completion @ Completion::Retrying { .. }) => {
                summary.retried += 1;
                tracing::info!(job_id = %job.id, "{}", completion);
            }
            Some(Completion::Failed { .. }) => summary.failed += 1,
            None => summary.unreported += 1,
        }
    }

    /// Deliver one verdict. Only requests that never left the worker are
    /// resent, so a verdict is applied at most once.
    async fn report(&self, job_id: Uuid, outcome: Outcome) -> Option<Completion> {
        let mut attempt = 1;
        loop {
            match self.dispatch.complete(job_id, outcome).await {
                Ok(completion) => return Some(completion),
                Err(e) if e.is_unsent() && attempt < self.config.report_attempts => {
                    tracing::warn!(job_id = %job_id, error = %e, attempt, "Report not delivered, retrying");
                    attempt += 1;
                    tokio::time::sleep(self.config.transport_backoff).await;
                }
                Err(e) => {
                    tracing::error!(job_id = %job_id, outcome = %outcome, error = %e, "Report rejected or lost");
                    return None;
                }
            }
        }
    }

    async fn pause(&self, duration: Duration, shutdown: &CancellationToken) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = shutdown.cancelled() => {}
        }
    }
}
