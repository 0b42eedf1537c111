// crates/core/src/job.rs
//! Job model shared by the store, the workers and the delivery layers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque, client-visible job identifier (UUID v4 text).
pub type JobId = String;

/// Generate a fresh job id.
pub fn new_job_id() -> JobId {
    uuid::Uuid::new_v4().to_string()
}

/// Lifecycle status of a job.
///
/// Transitions only move forward: `queued → running → {done | error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "codegen", derive(ts_rs::TS))]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../bindings/"))]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        }
    }

    /// `done` and `error` are final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown job status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "done" => Ok(JobStatus::Done),
            "error" => Ok(JobStatus::Error),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A persisted job row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub owner_id: String,
    pub job_type: String,
    pub status: JobStatus,
    pub story_id: Option<String>,
    pub storyboard_id: Option<String>,
    pub payload: Value,
    pub snapshot: Value,
    pub progress_version: i64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Client-facing view of this job.
    pub fn view(&self) -> JobView {
        JobView {
            id: self.id.clone(),
            job_type: self.job_type.clone(),
            status: self.status,
            snapshot: self.snapshot.clone(),
            error_message: self.error_message.clone(),
        }
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner_id == user_id
    }
}

/// Input for enqueueing a job. The store assigns status, version and timestamps.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub id: JobId,
    pub owner_id: String,
    pub job_type: String,
    pub payload: Value,
    pub snapshot: Value,
    pub story_id: Option<String>,
    pub storyboard_id: Option<String>,
}

impl NewJob {
    /// New job with a generated id and a `{"status":"queued"}` snapshot.
    pub fn new(owner_id: impl Into<String>, job_type: impl Into<String>, payload: Value) -> Self {
        Self {
            id: new_job_id(),
            owner_id: owner_id.into(),
            job_type: job_type.into(),
            payload,
            snapshot: serde_json::json!({ "status": "queued" }),
            story_id: None,
            storyboard_id: None,
        }
    }

    pub fn with_story(mut self, story_id: Option<String>, storyboard_id: Option<String>) -> Self {
        self.story_id = story_id;
        self.storyboard_id = storyboard_id;
        self
    }
}

/// A single write applied by the worker that holds the claim.
///
/// `snapshot: None` keeps the stored snapshot. Every applied patch bumps
/// `progress_version` by one.
#[derive(Debug, Clone, PartialEq)]
pub struct JobPatch {
    pub status: JobStatus,
    pub snapshot: Option<Value>,
    pub error_message: Option<String>,
}

impl JobPatch {
    /// Intermediate progress while the job is running.
    pub fn progress(snapshot: Value) -> Self {
        Self {
            status: JobStatus::Running,
            snapshot: Some(snapshot),
            error_message: None,
        }
    }

    pub fn done(result: Value) -> Self {
        Self {
            status: JobStatus::Done,
            snapshot: Some(result),
            error_message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Error,
            snapshot: None,
            error_message: Some(message.into()),
        }
    }
}

/// Shape returned by the polling endpoint and carried by every SSE data frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "codegen", derive(ts_rs::TS))]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../bindings/"))]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub id: JobId,
    #[serde(rename = "type")]
    pub job_type: String,
    pub status: JobStatus,
    #[cfg_attr(feature = "codegen", ts(type = "Record<string, unknown>"))]
    pub snapshot: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl JobView {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Response of the enqueue endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "codegen", derive(ts_rs::TS))]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../bindings/"))]
#[serde(rename_all = "camelCase")]
pub struct EnqueuedJob {
    pub job_id: JobId,
    pub status: JobStatus,
}
