use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{QueueError, Result};
use crate::scheduler::job::{JobStatus, Outcome, DEFAULT_MAX_RETRIES};
use crate::scheduler::store::JobStore;

/// Result of reporting an execution outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Completion {
    Passed,
    Retrying { attempt: u32, max_retries: u32 },
    Failed { max_retries: u32 },
}

impl std::fmt::Display for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Completion::Passed => write!(f, "Job completed successfully"),
            Completion::Retrying {
                attempt,
                max_retries,
            } => write!(f, "Retrying job (attempt {}/{})", attempt, max_retries),
            Completion::Failed { .. } => write!(f, "Job failed after max retries"),
        }
    }
}

/// Completion transition and the retry bound given to new jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Retry bound stamped on newly submitted jobs.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Apply a worker's verdict to a running job.
    ///
    /// A pass is terminal. A failure re-queues the job while it has retries
    /// left and is terminal otherwise. Reports against a job that is not
    /// running are rejected and leave it untouched, so a stale or duplicate
    /// report cannot overwrite a newer state.
    pub fn complete(&self, store: &mut JobStore, id: &Uuid, outcome: Outcome) -> Result<Completion> {
        let job = store
            .get(id)
            .ok_or_else(|| QueueError::JobNotFound(id.to_string()))?;

        let (next, retry_delta) = match outcome {
            Outcome::Passed => (JobStatus::Passed, 0),
            Outcome::Failed if job.retries < job.max_retries => (JobStatus::Queued, 1),
            Outcome::Failed => (JobStatus::Failed, 0),
        };

        let job = store.mutate_status(id, next, retry_delta)?;
        let completion = match job.status {
            JobStatus::Passed => Completion::Passed,
            JobStatus::Queued => Completion::Retrying {
                attempt: job.retries,
                max_retries: job.max_retries,
            },
            _ => Completion::Failed {
                max_retries: job.max_retries,
            },
        };

        match completion {
            Completion::Retrying { .. } => {
                tracing::warn!(job_id = %id, retries = job.retries, max_retries = job.max_retries, "Job failed, re-queued")
            }
            _ => tracing::info!(job_id = %id, status = %job.status, retries = job.retries, "Job finished"),
        }
        Ok(completion)
    }
}
