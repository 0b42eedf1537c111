//! HTTP access to a jobline server.

use std::time::Duration;

use async_trait::async_trait;
use jobline_core::{EnqueuedJob, JobSource, JobView, SourceError};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Identity header the server reads unless configured otherwise.
pub const DEFAULT_AUTH_HEADER: &str = "x-user-id";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EnqueueBody<'a> {
    #[serde(rename = "type")]
    job_type: &'a str,
    payload: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    story_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    storyboard_id: Option<&'a str>,
}

/// Reads and enqueues jobs over HTTP as one user.
#[derive(Debug, Clone)]
pub struct HttpJobSource {
    client: reqwest::Client,
    base_url: String,
    user_id: String,
    auth_header: String,
}

impl HttpJobSource {
    pub fn new(base_url: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_id: user_id.into(),
            auth_header: DEFAULT_AUTH_HEADER.to_string(),
        }
    }

    pub fn with_auth_header(mut self, header: impl Into<String>) -> Self {
        self.auth_header = header.into();
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `POST /api/jobs`. The server answers 202 with the new job id.
    pub async fn enqueue(&self, job_type: &str, payload: &Value) -> Result<EnqueuedJob, ClientError> {
        self.enqueue_for_story(job_type, payload, None, None).await
    }

    pub async fn enqueue_for_story(
        &self,
        job_type: &str,
        payload: &Value,
        story_id: Option<&str>,
        storyboard_id: Option<&str>,
    ) -> Result<EnqueuedJob, ClientError> {
        let body = EnqueueBody {
            job_type,
            payload,
            story_id,
            storyboard_id,
        };
        let response = self
            .client
            .post(self.url("/api/jobs"))
            .header(self.auth_header.as_str(), self.user_id.as_str())
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<EnqueuedJob>().await?)
    }
}

#[async_trait]
impl JobSource for HttpJobSource {
    async fn fetch_job(&self, job_id: &str) -> Result<JobView, SourceError> {
        let response = self
            .client
            .get(self.url(&format!("/api/jobs/{job_id}")))
            .header(self.auth_header.as_str(), self.user_id.as_str())
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| SourceError::Transient(e.to_string()))?;

        match response.status() {
            s if s.is_success() => response
                .json::<JobView>()
                .await
                .map_err(|e| SourceError::Transient(e.to_string())),
            StatusCode::NOT_FOUND => Err(SourceError::NotFound(job_id.to_string())),
            StatusCode::FORBIDDEN => Err(SourceError::Forbidden(job_id.to_string())),
            StatusCode::UNAUTHORIZED => Err(SourceError::Unauthorized),
            s => Err(SourceError::Transient(format!("HTTP {s}"))),
        }
    }
}
