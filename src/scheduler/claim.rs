use crate::scheduler::job::{JobRecord, JobStatus};
use crate::scheduler::store::JobStore;

/// Hands queued jobs to workers.
///
/// Selection is the smallest priority number; ties go to the job submitted
/// first. Callers must hold exclusive access to the store for the whole
/// call, which is what makes select-then-mark a single step.
#[derive(Debug, Default, Clone, Copy)]
pub struct Scheduler;

impl Scheduler {
    pub fn new() -> Self {
        Self
    }

    /// Claim the next queued job, marking it running.
    ///
    /// Returns `None` when nothing is queued.
    pub fn claim_next(&self, store: &mut JobStore, worker_id: Option<&str>) -> Option<JobRecord> {
        let job_id = store.next_ready()?;

        match store.mutate_status(&job_id, JobStatus::Running, 0) {
            Ok(_) => {}
            Err(e) => {
                // The ready index only ever holds queued ids.
                tracing::error!(job_id = %job_id, error = %e, "Ready job could not be claimed");
                return None;
            }
        }
        store.set_claimed_by(&job_id, worker_id);

        let job = store.get(&job_id)?.clone();
        tracing::info!(
            job_id = %job.id,
            priority = job.priority,
            worker_id = worker_id.unwrap_or("-"),
            attempt = job.retries + 1,
            "Job claimed"
        );
        Some(job)
    }
}
