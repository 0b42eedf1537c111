// crates/server/src/jobs/handler.rs
//! Task handlers and the registry that maps job types to them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jobline_core::{JobId, JobPatch, TaskError};
use jobline_db::Database;
use serde_json::{json, Value};

/// Work for one job type.
///
/// `run` returns the final snapshot on success. Returning an error (or
/// panicking) marks the job `error` with the message; the worker loop keeps
/// going either way.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn run(&self, payload: Value, ctx: JobContext) -> Result<Value, TaskError>;
}

/// Handle a running task uses to publish intermediate snapshots.
#[derive(Clone)]
pub struct JobContext {
    job_id: JobId,
    db: Database,
}

impl JobContext {
    pub fn new(job_id: JobId, db: Database) -> Self {
        Self { job_id, db }
    }

    /// Replace the job's snapshot while it keeps running. Returns the new
    /// progress version.
    pub async fn publish(&self, snapshot: Value) -> Result<i64, TaskError> {
        let version = self
            .db
            .update_job(&self.job_id, &JobPatch::progress(snapshot))
            .await
            .map_err(|e| TaskError::Other(e.into()))?;
        tracing::debug!(job_id = %self.job_id, version, "progress published");
        Ok(version)
    }
}

/// Job type → handler. Built once at startup.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, job_type: impl Into<String>, handler: impl JobHandler) {
        self.handlers.insert(job_type.into(), Arc::new(handler));
    }

    pub fn with(mut self, job_type: impl Into<String>, handler: impl JobHandler) -> Self {
        self.register(job_type, handler);
        self
    }

    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).cloned()
    }

    pub fn contains(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    /// Registered types, sorted.
    pub fn job_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }
}

pub const ECHO_JOB_TYPE: &str = "echo";

/// Demo handler: reports two stages and returns its payload.
///
/// Payload knobs: `delayMs` (capped at 10 s) pauses between stages, `fail`
/// makes the task fail with that message.
pub struct EchoHandler;

const ECHO_MAX_DELAY_MS: u64 = 10_000;

#[async_trait]
impl JobHandler for EchoHandler {
    async fn run(&self, payload: Value, ctx: JobContext) -> Result<Value, TaskError> {
        let delay = payload
            .get("delayMs")
            .and_then(Value::as_u64)
            .unwrap_or(0)
            .min(ECHO_MAX_DELAY_MS);

        ctx.publish(json!({ "status": "running", "stage": "received" }))
            .await?;
        tokio::time::sleep(Duration::from_millis(delay)).await;

        if let Some(message) = payload.get("fail").and_then(Value::as_str) {
            return Err(TaskError::failed(message));
        }

        ctx.publish(json!({ "status": "running", "stage": "echoing" }))
            .await?;
        tokio::time::sleep(Duration::from_millis(delay)).await;

        Ok(payload)
    }
}
