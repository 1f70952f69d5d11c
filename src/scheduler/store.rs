use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::Utc;
use uuid::Uuid;

use crate::error::{QueueError, Result};
use crate::scheduler::job::{JobDescriptor, JobRecord, JobStatus};

/// Dispatch order of a queued record: priority first, then submission order.
type ReadyKey = (i64, u64, Uuid);

/// Owns every job record for the lifetime of the process.
///
/// Records are never removed. Besides the primary map the store keeps two
/// indices that hold ids only: one grouping jobs by app version (for
/// enumeration) and one holding exactly the queued jobs in dispatch order.
/// Nothing is persisted; a restart starts from an empty store.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: HashMap<Uuid, JobRecord>,
    by_app_version: BTreeMap<String, Vec<Uuid>>,
    ready: BTreeSet<ReadyKey>,
    next_seq: u64,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new queued job and return its id.
    pub fn insert(&mut self, descriptor: JobDescriptor, max_retries: u32) -> Uuid {
        let mut id = Uuid::new_v4();
        while self.jobs.contains_key(&id) {
            id = Uuid::new_v4();
        }
        self.next_seq += 1;
        let record = JobRecord::new(id, self.next_seq, descriptor, max_retries);

        self.ready.insert(ready_key(&record));
        self.by_app_version
            .entry(record.app_version_id.clone())
            .or_default()
            .push(id);
        self.jobs.insert(id, record);
        id
    }

    pub fn get(&self, id: &Uuid) -> Option<&JobRecord> {
        self.jobs.get(id)
    }

    /// All queued jobs, in dispatch order.
    pub fn all_queued(&self) -> Vec<&JobRecord> {
        self.ready
            .iter()
            .filter_map(|(_, _, id)| self.jobs.get(id))
            .collect()
    }

    /// Queued jobs of one app version, in submission order.
    pub fn queued_by_app_version(&self, app_version_id: &str) -> Vec<&JobRecord> {
        self.by_app_version
            .get(app_version_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.jobs.get(id))
                    .filter(|job| job.status == JobStatus::Queued)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every known app version, sorted.
    pub fn app_versions(&self) -> impl Iterator<Item = &str> {
        self.by_app_version.keys().map(String::as_str)
    }

    /// Every job, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &JobRecord> {
        self.jobs.values()
    }

    /// Every job in submission order.
    pub fn all_jobs(&self) -> Vec<&JobRecord> {
        let mut jobs: Vec<&JobRecord> = self.jobs.values().collect();
        jobs.sort_by_key(|j| j.seq);
        jobs
    }

    /// The queued job that should be dispatched next, if any.
    pub(crate) fn next_ready(&self) -> Option<Uuid> {
        self.ready.first().map(|(_, _, id)| *id)
    }

    /// Move a job along one lifecycle edge, adding `retry_delta` to its
    /// retry counter.
    ///
    /// Only the scheduler and the retry policy call this. Edges outside the
    /// lifecycle, and increments that would push `retries` past
    /// `max_retries`, are rejected without touching the record.
    pub(crate) fn mutate_status(
        &mut self,
        id: &Uuid,
        new_status: JobStatus,
        retry_delta: u32,
    ) -> Result<&JobRecord> {
        let job = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| QueueError::JobNotFound(id.to_string()))?;

        let retries = job.retries.saturating_add(retry_delta);
        if !job.status.can_transition_to(new_status) || retries > job.max_retries {
            return Err(QueueError::InvalidTransition {
                job_id: *id,
                from: job.status,
                to: new_status,
            });
        }

        let key = ready_key(job);
        match (job.status, new_status) {
            (JobStatus::Queued, _) => {
                self.ready.remove(&key);
            }
            (_, JobStatus::Queued) => {
                self.ready.insert(key);
            }
            _ => {}
        }

        let now = Utc::now();
        job.status = new_status;
        job.retries = retries;
        match new_status {
            JobStatus::Running => job.started_at = Some(now),
            JobStatus::Passed | JobStatus::Failed => job.completed_at = Some(now),
            JobStatus::Queued => {}
        }
        Ok(job)
    }

    pub(crate) fn set_claimed_by(&mut self, id: &Uuid, worker_id: Option<&str>) {
        if let Some(job) = self.jobs.get_mut(id) {
            job.claimed_by = worker_id.map(str::to_string);
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

fn ready_key(job: &JobRecord) -> ReadyKey {
    (job.priority, job.seq, job.id)
}
