use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{QueueError, Result};
use crate::scheduler::claim::Scheduler;
use crate::scheduler::job::{JobRecord, JobStatus, Outcome, SubmitJobRequest};
use crate::scheduler::retry::{Completion, RetryPolicy};
use crate::scheduler::store::JobStore;

/// Queued job as shown by the debug listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedJobSummary {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub priority: i64,
    pub retries: u32,
    pub max_retries: u32,
}

impl From<&JobRecord> for QueuedJobSummary {
    fn from(job: &JobRecord) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            priority: job.priority,
            retries: job.retries,
            max_retries: job.max_retries,
        }
    }
}

/// Job counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub queued: usize,
    pub running: usize,
    pub passed: usize,
    pub failed: usize,
}

/// In-process dispatch service shared by the HTTP layer and local workers.
///
/// The store sits behind one lock. Submissions, claims and completions take
/// it exclusively; reads take it shared and return owned snapshots.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    store: Arc<RwLock<JobStore>>,
    scheduler: Scheduler,
    policy: RetryPolicy,
}

impl Dispatcher {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            store: Arc::new(RwLock::new(JobStore::new())),
            scheduler: Scheduler::new(),
            policy,
        }
    }

    pub async fn submit(&self, request: SubmitJobRequest) -> Result<Uuid> {
        let descriptor = request.validate()?;
        let (app_version_id, priority) = (descriptor.app_version_id.clone(), descriptor.priority);

        let job_id = self
            .store
            .write()
            .await
            .insert(descriptor, self.policy.max_retries());

        tracing::info!(
            job_id = %job_id,
            app_version_id = %app_version_id,
            priority,
            "Job submitted"
        );
        Ok(job_id)
    }

    pub async fn status(&self, job_id: &Uuid) -> Result<JobRecord> {
        self.store
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))
    }

    /// Every job in submission order.
    pub async fn list(&self) -> Vec<JobRecord> {
        self.store
            .read()
            .await
            .all_jobs()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Claim the next job. `None` means nothing is queued.
    pub async fn claim(&self, worker_id: Option<&str>) -> Option<JobRecord> {
        let mut store = self.store.write().await;
        self.scheduler.claim_next(&mut store, worker_id)
    }

    pub async fn complete(&self, job_id: &Uuid, outcome: Outcome) -> Result<Completion> {
        let mut store = self.store.write().await;
        self.policy.complete(&mut store, job_id, outcome)
    }

    /// Queued jobs grouped by app version. Every known app version is
    /// listed, even when none of its jobs are queued.
    pub async fn debug(&self) -> BTreeMap<String, Vec<QueuedJobSummary>> {
        let store = self.store.read().await;
        let groups = store
            .app_versions()
            .map(|app_version_id| {
                let queued: Vec<QueuedJobSummary> = store
                    .queued_by_app_version(app_version_id)
                    .into_iter()
                    .map(QueuedJobSummary::from)
                    .collect();
                (app_version_id.to_string(), queued)
            })
            .collect();
        groups
    }

    pub async fn stats(&self) -> QueueStats {
        let store = self.store.read().await;
        let stats = store.iter().fold(QueueStats::default(), |mut stats, job| {
            match job.status {
                JobStatus::Queued => stats.queued += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Passed => stats.passed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
            stats
        });
        stats
    }
}
