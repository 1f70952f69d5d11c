use std::time::Duration;

use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::api::{
    CompleteJobRequest, CompleteJobResponse, DebugResponse, ErrorBody, HealthResponse,
    JobStatusResponse, SubmitJobResponse,
};
use crate::config::ClientConfig;
use crate::error::{QueueError, Result};
use crate::scheduler::{JobRecord, Outcome, SubmitJobRequest};

/// HTTP client for the dispatch server.
///
/// Server-side rejections come back as the same typed [`QueueError`] the
/// server produced; anything that went wrong on the way is
/// [`QueueError::Transport`].
#[derive(Debug, Clone)]
pub struct DispatchClient {
    http: reqwest::Client,
    base_url: String,
    poll_interval: Duration,
}

impl DispatchClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: config.server_url.trim_end_matches('/').to_string(),
            poll_interval: config.poll_interval,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn submit(&self, request: &SubmitJobRequest) -> Result<Uuid> {
        let response = self
            .http
            .post(self.url("/jobs/submit"))
            .json(request)
            .send()
            .await?;
        let body: SubmitJobResponse = decode(response).await?;
        Ok(body.job_id)
    }

    pub async fn status(&self, job_id: &str) -> Result<JobStatusResponse> {
        let response = self
            .http
            .get(self.url(&format!("/jobs/status/{}", job_id)))
            .send()
            .await?;
        decode(response).await
    }

    pub async fn list(&self) -> Result<Vec<JobRecord>> {
        let response = self.http.get(self.url("/jobs")).send().await?;
        decode(response).await
    }

    /// Claim the next job. `Ok(None)` means nothing is queued.
    pub async fn claim(&self, worker_id: Option<&str>) -> Result<Option<JobRecord>> {
        let mut request = self.http.get(self.url("/jobs/next"));
        if let Some(worker_id) = worker_id {
            request = request.query(&[("worker_id", worker_id)]);
        }
        let response = request.send().await?;
        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }
        decode(response).await.map(Some)
    }

    pub async fn complete(&self, job_id: &Uuid, outcome: Outcome) -> Result<CompleteJobResponse> {
        let response = self
            .http
            .post(self.url(&format!("/jobs/complete/{}", job_id)))
            .json(&CompleteJobRequest { status: outcome })
            .send()
            .await?;
        decode(response).await
    }

    pub async fn debug(&self) -> Result<DebugResponse> {
        let response = self.http.get(self.url("/jobs/debug")).send().await?;
        decode(response).await
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        let response = self.http.get(self.url("/health")).send().await?;
        decode(response).await
    }

    /// Poll a job until it reaches `passed` or `failed`.
    ///
    /// `on_change` sees every distinct status observed, including the first
    /// one. Errors end the wait immediately; an unknown job is never polled
    /// again.
    pub async fn wait_for_terminal<F>(&self, job_id: &str, mut on_change: F) -> Result<JobStatusResponse>
    where
        F: FnMut(&JobStatusResponse),
    {
        let mut last_status = None;
        loop {
            let current = self.status(job_id).await?;
            if last_status != Some(current.status) {
                on_change(&current);
                last_status = Some(current.status);
            }
            if current.status.is_terminal() {
                return Ok(current);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let body = response.text().await?;
    Err(match serde_json::from_str::<ErrorBody>(&body) {
        Ok(error) => error.into_error(status.as_u16()),
        Err(_) => QueueError::UnexpectedResponse {
            status: status.as_u16(),
            body,
        },
    })
}
