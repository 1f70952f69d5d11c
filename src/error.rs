use thiserror::Error;
use uuid::Uuid;

use crate::scheduler::JobStatus;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Invalid transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected response ({status}): {body}")]
    UnexpectedResponse { status: u16, body: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl QueueError {
    /// True for failures between caller and server, as opposed to a
    /// rejection by the server itself.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            QueueError::Transport(_) | QueueError::UnexpectedResponse { .. }
        )
    }

    /// True when the request never reached the server (connection refused,
    /// DNS failure). Resending such a request cannot apply it twice.
    pub fn is_unsent(&self) -> bool {
        matches!(self, QueueError::Transport(e) if e.is_connect())
    }

    /// Stable machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            QueueError::JobNotFound(_) => "not_found",
            QueueError::InvalidTransition { .. } => "invalid_transition",
            QueueError::Validation(_) => "validation_error",
            QueueError::Transport(_) => "transport_error",
            QueueError::UnexpectedResponse { .. } => "unexpected_response",
            QueueError::Internal(_) => "internal_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;
