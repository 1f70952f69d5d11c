use testq::error::QueueError;
use testq::scheduler::{
    Completion, JobDescriptor, JobStatus, JobStore, Outcome, RetryPolicy, Scheduler, Target,
};
use uuid::Uuid;

fn descriptor(app_version_id: &str, test_path: &str, priority: i64) -> JobDescriptor {
    JobDescriptor {
        org_id: "qualgent".to_string(),
        app_version_id: app_version_id.to_string(),
        test_path: test_path.to_string(),
        priority,
        target: Target::Device,
    }
}

#[test]
fn test_insert_creates_queued_record() {
    let mut store = JobStore::new();
    let id = store.insert(descriptor("v1", "tests/login.spec.ts", 4), 2);

    let job = store.get(&id).unwrap();
    assert_eq!(job.id, id);
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.retries, 0);
    assert_eq!(job.max_retries, 2);
    assert_eq!(job.priority, 4);
    assert_eq!(job.test_path, "tests/login.spec.ts");
    assert!(job.claimed_by.is_none());
    assert_eq!(store.len(), 1);
}

#[test]
fn test_ids_and_sequence_are_unique() {
    let mut store = JobStore::new();
    let ids: Vec<Uuid> = (0..50)
        .map(|i| store.insert(descriptor("v1", &format!("t{}", i), 1), 2))
        .collect();

    let mut unique = ids.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 50);

    let seqs: Vec<u64> = store.all_jobs().iter().map(|j| j.seq).collect();
    assert_eq!(seqs, (1..=50).collect::<Vec<u64>>());
}

#[test]
fn test_get_unknown_id() {
    let store = JobStore::new();
    assert!(store.get(&Uuid::new_v4()).is_none());
    assert!(store.is_empty());
}

#[test]
fn test_queued_by_app_version() {
    let mut store = JobStore::new();
    let a1 = store.insert(descriptor("v1", "a1", 1), 2);
    let _b1 = store.insert(descriptor("v2", "b1", 1), 2);
    let a2 = store.insert(descriptor("v1", "a2", 0), 2);

    let v1: Vec<Uuid> = store
        .queued_by_app_version("v1")
        .iter()
        .map(|j| j.id)
        .collect();
    assert_eq!(v1, vec![a1, a2]);
    assert_eq!(store.queued_by_app_version("v2").len(), 1);
    assert!(store.queued_by_app_version("v3").is_empty());
    assert_eq!(store.app_versions().collect::<Vec<_>>(), vec!["v1", "v2"]);
    assert_eq!(store.all_queued().len(), 3);

    // Claimed jobs drop out of the queued views but stay in the store.
    Scheduler::new().claim_next(&mut store, None).unwrap();
    assert_eq!(store.queued_by_app_version("v1").len(), 1);
    assert_eq!(store.all_queued().len(), 2);
    assert_eq!(store.len(), 3);
}

#[test]
fn test_claim_follows_priority() {
    let mut store = JobStore::new();
    let scheduler = Scheduler::new();
    let p5 = store.insert(descriptor("v1", "five", 5), 2);
    let p1 = store.insert(descriptor("v1", "one", 1), 2);
    let p3 = store.insert(descriptor("v2", "three", 3), 2);

    assert_eq!(scheduler.claim_next(&mut store, None).unwrap().id, p1);
    assert_eq!(scheduler.claim_next(&mut store, None).unwrap().id, p3);
    assert_eq!(scheduler.claim_next(&mut store, None).unwrap().id, p5);
    assert!(scheduler.claim_next(&mut store, None).is_none());
}

#[test]
fn test_claim_ties_break_by_submission_order() {
    let mut store = JobStore::new();
    let scheduler = Scheduler::new();
    // Spread across groups so group enumeration order cannot decide.
    let first = store.insert(descriptor("zeta", "first", 2), 2);
    let second = store.insert(descriptor("alpha", "second", 2), 2);
    let third = store.insert(descriptor("mid", "third", 2), 2);

    let order: Vec<Uuid> = std::iter::from_fn(|| scheduler.claim_next(&mut store, None))
        .map(|j| j.id)
        .collect();
    assert_eq!(order, vec![first, second, third]);
}

#[test]
fn test_negative_priority_dispatches_first() {
    let mut store = JobStore::new();
    store.insert(descriptor("v1", "normal", 1), 2);
    let urgent = store.insert(descriptor("v1", "urgent", -10), 2);

    let job = Scheduler::new().claim_next(&mut store, None).unwrap();
    assert_eq!(job.id, urgent);
}

#[test]
fn test_claim_marks_running_and_records_worker() {
    let mut store = JobStore::new();
    let id = store.insert(descriptor("v1", "t", 1), 2);

    let claimed = Scheduler::new()
        .claim_next(&mut store, Some("worker-7"))
        .unwrap();
    assert_eq!(claimed.status, JobStatus::Running);
    assert_eq!(claimed.claimed_by.as_deref(), Some("worker-7"));
    assert!(claimed.started_at.is_some());

    let stored = store.get(&id).unwrap();
    assert_eq!(stored.status, JobStatus::Running);
    assert_eq!(stored, &claimed);
}

#[test]
fn test_complete_passed() {
    let mut store = JobStore::new();
    let policy = RetryPolicy::default();
    let id = store.insert(descriptor("v1", "t", 1), policy.max_retries());
    Scheduler::new().claim_next(&mut store, None).unwrap();

    let completion = policy.complete(&mut store, &id, Outcome::Passed).unwrap();
    assert_eq!(completion, Completion::Passed);
    assert_eq!(completion.to_string(), "Job completed successfully");

    let job = store.get(&id).unwrap();
    assert_eq!(job.status, JobStatus::Passed);
    assert_eq!(job.retries, 0);
    assert!(job.completed_at.is_some());
}

#[test]
fn test_always_failing_job_exhausts_retries() {
    let mut store = JobStore::new();
    let scheduler = Scheduler::new();
    let policy = RetryPolicy::new(2);
    let id = store.insert(descriptor("v1", "flaky", 1), policy.max_retries());

    let mut observed = vec![(store.get(&id).unwrap().status, 0)];
    let mut messages = Vec::new();
    loop {
        let job = scheduler.claim_next(&mut store, None).unwrap();
        observed.push((job.status, job.retries));

        let completion = policy.complete(&mut store, &id, Outcome::Failed).unwrap();
        messages.push(completion.to_string());
        let job = store.get(&id).unwrap();
        observed.push((job.status, job.retries));
        assert!(job.retries <= job.max_retries);
        if job.status.is_terminal() {
            break;
        }
    }

    assert_eq!(
        observed,
        vec![
            (JobStatus::Queued, 0),
            (JobStatus::Running, 0),
            (JobStatus::Queued, 1),
            (JobStatus::Running, 1),
            (JobStatus::Queued, 2),
            (JobStatus::Running, 2),
            (JobStatus::Failed, 2),
        ]
    );
    assert_eq!(
        messages,
        vec![
            "Retrying job (attempt 1/2)",
            "Retrying job (attempt 2/2)",
            "Job failed after max retries",
        ]
    );
    assert!(scheduler.claim_next(&mut store, None).is_none());
}

#[test]
fn test_fail_once_then_pass() {
    let mut store = JobStore::new();
    let scheduler = Scheduler::new();
    let policy = RetryPolicy::default();
    let id = store.insert(descriptor("v1", "t", 1), policy.max_retries());

    scheduler.claim_next(&mut store, None).unwrap();
    let completion = policy.complete(&mut store, &id, Outcome::Failed).unwrap();
    assert_eq!(
        completion,
        Completion::Retrying {
            attempt: 1,
            max_retries: 2
        }
    );
    assert_eq!(store.get(&id).unwrap().status, JobStatus::Queued);

    scheduler.claim_next(&mut store, None).unwrap();
    policy.complete(&mut store, &id, Outcome::Passed).unwrap();

    let job = store.get(&id).unwrap();
    assert_eq!(job.status, JobStatus::Passed);
    assert_eq!(job.retries, 1);
}

#[test]
fn test_zero_retries_fails_immediately() {
    let mut store = JobStore::new();
    let policy = RetryPolicy::new(0);
    let id = store.insert(descriptor("v1", "t", 1), policy.max_retries());
    Scheduler::new().claim_next(&mut store, None).unwrap();

    let completion = policy.complete(&mut store, &id, Outcome::Failed).unwrap();
    assert_eq!(completion, Completion::Failed { max_retries: 0 });
    assert_eq!(store.get(&id).unwrap().status, JobStatus::Failed);
}

#[test]
fn test_retried_job_requeues_behind_earlier_same_priority_jobs() {
    let mut store = JobStore::new();
    let scheduler = Scheduler::new();
    let policy = RetryPolicy::default();
    let first = store.insert(descriptor("v1", "first", 1), 2);
    let second = store.insert(descriptor("v1", "second", 1), 2);

    assert_eq!(scheduler.claim_next(&mut store, None).unwrap().id, first);
    policy.complete(&mut store, &first, Outcome::Failed).unwrap();

    // The retry keeps its original submission slot.
    assert_eq!(scheduler.claim_next(&mut store, None).unwrap().id, first);
    assert_eq!(scheduler.claim_next(&mut store, None).unwrap().id, second);
}

#[test]
fn test_complete_rejects_non_running_jobs() {
    let mut store = JobStore::new();
    let policy = RetryPolicy::default();
    let id = store.insert(descriptor("v1", "t", 1), 2);

    // Still queued.
    for outcome in [Outcome::Passed, Outcome::Failed] {
        let before = store.get(&id).unwrap().clone();
        let err = policy.complete(&mut store, &id, outcome).unwrap_err();
        assert!(matches!(
            err,
            QueueError::InvalidTransition {
                from: JobStatus::Queued,
                ..
            }
        ));
        assert_eq!(store.get(&id).unwrap(), &before);
    }

    // Already terminal.
    Scheduler::new().claim_next(&mut store, None).unwrap();
    policy.complete(&mut store, &id, Outcome::Passed).unwrap();
    let before = store.get(&id).unwrap().clone();
    for outcome in [Outcome::Passed, Outcome::Failed] {
        let err = policy.complete(&mut store, &id, outcome).unwrap_err();
        assert!(matches!(
            err,
            QueueError::InvalidTransition {
                from: JobStatus::Passed,
                ..
            }
        ));
    }
    assert_eq!(store.get(&id).unwrap(), &before);
}

#[test]
fn test_duplicate_report_does_not_overwrite_retry() {
    let mut store = JobStore::new();
    let scheduler = Scheduler::new();
    let policy = RetryPolicy::default();
    let id = store.insert(descriptor("v1", "t", 1), 2);

    scheduler.claim_next(&mut store, None).unwrap();
    policy.complete(&mut store, &id, Outcome::Failed).unwrap();

    // A stale second report for the same run arrives after the re-queue.
    let err = policy.complete(&mut store, &id, Outcome::Passed).unwrap_err();
    assert!(matches!(err, QueueError::InvalidTransition { .. }));
    let job = store.get(&id).unwrap();
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.retries, 1);
}

#[test]
fn test_complete_unknown_job() {
    let mut store = JobStore::new();
    let id = Uuid::new_v4();
    let err = RetryPolicy::default()
        .complete(&mut store, &id, Outcome::Passed)
        .unwrap_err();
    match err {
        QueueError::JobNotFound(missing) => assert_eq!(missing, id.to_string()),
        other => panic!("expected JobNotFound, got {:?}", other),
    }
}
