//! HTTP binding of the dispatch service.
//!
//! | Route | Operation |
//! |---|---|
//! | `POST /jobs/submit` | submit a job |
//! | `GET /jobs/status/{job_id}` | status of one job |
//! | `GET /jobs` | every job, in submission order |
//! | `GET /jobs/next?worker_id=` | claim the next job (204 when none) |
//! | `POST /jobs/complete/{job_id}` | report passed/failed |
//! | `GET /jobs/debug` | queued jobs grouped by app version |
//! | `GET /health` | liveness and job counts |

use std::collections::BTreeMap;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::error::{QueueError, Result};
use crate::scheduler::{
    Completion, Dispatcher, JobRecord, JobStatus, Outcome, QueueStats, QueuedJobSummary,
    SubmitJobRequest, Target,
};

#[derive(Clone)]
pub struct ApiState {
    pub dispatcher: Dispatcher,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitJobResponse {
    pub job_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub priority: i64,
    pub test_path: String,
    pub target: Target,
    pub org_id: String,
    pub app_version_id: String,
    pub retries: u32,
    pub max_retries: u32,
    pub claimed_by: Option<String>,
}

impl From<JobRecord> for JobStatusResponse {
    fn from(job: JobRecord) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            priority: job.priority,
            test_path: job.test_path,
            target: job.target,
            org_id: job.org_id,
            app_version_id: job.app_version_id,
            retries: job.retries,
            max_retries: job.max_retries,
            claimed_by: job.claimed_by,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NextJobQuery {
    pub worker_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteJobRequest {
    pub status: Outcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteJobResponse {
    pub job_id: Uuid,
    pub message: String,
    #[serde(flatten)]
    pub completion: Completion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub jobs: QueueStats,
}

pub type DebugResponse = BTreeMap<String, Vec<QueuedJobSummary>>;

/// Error body returned with every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<JobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<JobStatus>,
}

impl ErrorBody {
    fn new(err: &QueueError) -> Self {
        let mut body = Self {
            error: err.code().to_string(),
            message: err.to_string(),
            job_id: None,
            from: None,
            to: None,
        };
        match err {
            QueueError::JobNotFound(id) => body.job_id = Some(id.clone()),
            QueueError::InvalidTransition { job_id, from, to } => {
                body.job_id = Some(job_id.to_string());
                body.from = Some(*from);
                body.to = Some(*to);
            }
            _ => {}
        }
        body
    }

    /// Rebuild the typed error a server sent. Unknown codes become
    /// `UnexpectedResponse`.
    pub fn into_error(self, status: u16) -> QueueError {
        match self.error.as_str() {
            "not_found" => QueueError::JobNotFound(self.job_id.unwrap_or_default()),
            "invalid_transition" => {
                match (
                    self.job_id.as_deref().map(Uuid::parse_str),
                    self.from,
                    self.to,
                ) {
                    (Some(Ok(job_id)), Some(from), Some(to)) => {
                        QueueError::InvalidTransition { job_id, from, to }
                    }
                    _ => QueueError::UnexpectedResponse {
                        status,
                        body: self.message,
                    },
                }
            }
            "validation_error" => QueueError::Validation(
                self.message
                    .strip_prefix("Validation error: ")
                    .unwrap_or(&self.message)
                    .to_string(),
            ),
            "internal_error" => QueueError::Internal(self.message),
            _ => QueueError::UnexpectedResponse {
                status,
                body: self.message,
            },
        }
    }
}

impl IntoResponse for QueueError {
    fn into_response(self) -> Response {
        let status = match &self {
            QueueError::JobNotFound(_) => StatusCode::NOT_FOUND,
            QueueError::InvalidTransition { .. } => StatusCode::CONFLICT,
            QueueError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            QueueError::Transport(_) | QueueError::UnexpectedResponse { .. } => {
                StatusCode::BAD_GATEWAY
            }
            QueueError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(ErrorBody::new(&self))).into_response()
    }
}

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/jobs", get(list_jobs_handler))
        .route("/jobs/submit", post(submit_job_handler))
        .route("/jobs/status/:job_id", get(job_status_handler))
        .route("/jobs/next", get(next_job_handler))
        .route("/jobs/complete/:job_id", post(complete_job_handler))
        .route("/jobs/debug", get(debug_handler))
        .layer(cors)
        .with_state(state)
}

/// A path segment that is not a UUID cannot name a known job.
fn parse_job_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| QueueError::JobNotFound(raw.to_string()))
}

fn json_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| QueueError::Validation(rejection.body_text()))
}

async fn health_handler(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        jobs: state.dispatcher.stats().await,
    })
}

async fn list_jobs_handler(State(state): State<ApiState>) -> Json<Vec<JobRecord>> {
    Json(state.dispatcher.list().await)
}

async fn submit_job_handler(
    State(state): State<ApiState>,
    payload: std::result::Result<Json<SubmitJobRequest>, JsonRejection>,
) -> Result<Json<SubmitJobResponse>> {
    let request = json_body(payload)?;
    let job_id = state.dispatcher.submit(request).await?;
    Ok(Json(SubmitJobResponse { job_id }))
}

async fn job_status_handler(
    State(state): State<ApiState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusResponse>> {
    let job_id = parse_job_id(&job_id)?;
    let job = state.dispatcher.status(&job_id).await?;
    Ok(Json(job.into()))
}

async fn next_job_handler(
    State(state): State<ApiState>,
    Query(query): Query<NextJobQuery>,
) -> Response {
    match state.dispatcher.claim(query.worker_id.as_deref()).await {
        Some(job) => Json(job).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn complete_job_handler(
    State(state): State<ApiState>,
    Path(job_id): Path<String>,
    payload: std::result::Result<Json<CompleteJobRequest>, JsonRejection>,
) -> Result<Json<CompleteJobResponse>> {
    let job_id = parse_job_id(&job_id)?;
    let request = json_body(payload)?;
    let completion = state.dispatcher.complete(&job_id, request.status).await?;
    Ok(Json(CompleteJobResponse {
        job_id,
        message: completion.to_string(),
        completion,
    }))
}

async fn debug_handler(State(state): State<ApiState>) -> Json<DebugResponse> {
    Json(state.dispatcher.debug().await)
}
