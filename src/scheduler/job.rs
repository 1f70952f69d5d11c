use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{QueueError, Result};

pub const DEFAULT_PRIORITY: i64 = 1;
pub const DEFAULT_MAX_RETRIES: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Passed,
    Failed,
}

impl JobStatus {
    /// `passed` and `failed` admit no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Passed | JobStatus::Failed)
    }

    /// Edges of the job lifecycle: queued -> running -> {passed, queued, failed}.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Passed)
                | (JobStatus::Running, JobStatus::Queued)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Passed => write!(f, "passed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Where a test is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    #[default]
    Device,
    Emulator,
    BrowserStack,
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Device => write!(f, "device"),
            Target::Emulator => write!(f, "emulator"),
            Target::BrowserStack => write!(f, "browserstack"),
        }
    }
}

impl std::str::FromStr for Target {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "device" => Ok(Target::Device),
            "emulator" => Ok(Target::Emulator),
            "browserstack" => Ok(Target::BrowserStack),
            other => Err(QueueError::Validation(format!(
                "unrecognized target '{}', expected one of: device, emulator, browserstack",
                other
            ))),
        }
    }
}

/// Verdict reported by a worker for one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Passed,
    Failed,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Passed => write!(f, "passed"),
            Outcome::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for Outcome {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "passed" => Ok(Outcome::Passed),
            "failed" => Ok(Outcome::Failed),
            other => Err(QueueError::Validation(format!(
                "unrecognized outcome '{}', expected passed or failed",
                other
            ))),
        }
    }
}

/// Submission payload as it arrives from a client, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitJobRequest {
    pub org_id: String,
    pub app_version_id: String,
    pub test_path: String,
    #[serde(default = "default_priority")]
    pub priority: i64,
    #[serde(default)]
    pub target: Option<String>,
}

fn default_priority() -> i64 {
    DEFAULT_PRIORITY
}

impl SubmitJobRequest {
    pub fn new(
        org_id: impl Into<String>,
        app_version_id: impl Into<String>,
        test_path: impl Into<String>,
    ) -> Self {
        Self {
            org_id: org_id.into(),
            app_version_id: app_version_id.into(),
            test_path: test_path.into(),
            priority: DEFAULT_PRIORITY,
            target: None,
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_target(mut self, target: Target) -> Self {
        self.target = Some(target.to_string());
        self
    }

    /// Check required fields and resolve the target.
    pub fn validate(self) -> Result<JobDescriptor> {
        let org_id = required("org_id", self.org_id)?;
        let app_version_id = required("app_version_id", self.app_version_id)?;
        let test_path = required("test_path", self.test_path)?;
        let target = match self.target {
            Some(raw) => raw.parse()?,
            None => Target::default(),
        };

        Ok(JobDescriptor {
            org_id,
            app_version_id,
            test_path,
            priority: self.priority,
            target,
        })
    }
}

fn required(field: &str, value: String) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(QueueError::Validation(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

/// Validated, immutable description of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub org_id: String,
    pub app_version_id: String,
    pub test_path: String,
    pub priority: i64,
    pub target: Target,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub org_id: String,
    pub app_version_id: String,
    pub test_path: String,
    pub target: Target,
    pub priority: i64,
    pub status: JobStatus,
    pub retries: u32,
    pub max_retries: u32,
    /// Submission sequence number, the priority tie-break.
    pub seq: u64,
    pub claimed_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    pub fn new(id: Uuid, seq: u64, descriptor: JobDescriptor, max_retries: u32) -> Self {
        Self {
            id,
            org_id: descriptor.org_id,
            app_version_id: descriptor.app_version_id,
            test_path: descriptor.test_path,
            target: descriptor.target,
            priority: descriptor.priority,
            status: JobStatus::Queued,
            retries: 0,
            max_retries,
            seq,
            claimed_by: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}
