// crates/server/src/jobs/worker.rs
//! Worker loops: claim a job, run its handler, write the outcome.
//!
//! Each loop serves one job type. When a claim comes back empty the loop
//! idles until its poll timer fires, a kick arrives or shutdown is requested.
//! After finishing a job it claims again straight away, so a backlog drains
//! without waiting on the timer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use jobline_core::{Job, JobPatch};
use jobline_db::{Database, DbResult};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::handler::{JobContext, JobHandler};
use crate::config::WorkerConfig;
use crate::metrics::{record_claimed, record_finished};
use crate::state::AppState;

/// Attempts at writing a job's outcome before giving up on it.
const FINALIZE_ATTEMPTS: u32 = 3;

pub struct WorkerLoop {
    worker_id: String,
    job_type: String,
    handler: Arc<dyn JobHandler>,
    db: Database,
    kick: Arc<Notify>,
    config: WorkerConfig,
    shutdown: CancellationToken,
}

impl WorkerLoop {
    pub fn new(
        worker_id: impl Into<String>,
        job_type: impl Into<String>,
        handler: Arc<dyn JobHandler>,
        db: Database,
        kick: Arc<Notify>,
        config: WorkerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            job_type: job_type.into(),
            handler,
            db,
            kick,
            config,
            shutdown,
        }
    }

    /// Run until the shutdown token fires. A job already claimed is always
    /// carried through to its terminal write.
    pub async fn run(self) {
        info!(worker_id = %self.worker_id, job_type = %self.job_type, "Worker started");

        while !self.shutdown.is_cancelled() {
            match self.tick().await {
                Ok(true) => continue,
                Ok(false) => {
                    tokio::select! {
                        biased;
                        _ = self.shutdown.cancelled() => break,
                        _ = self.kick.notified() => {
                            debug!(worker_id = %self.worker_id, "Woken by kick");
                        }
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
                Err(e) => {
                    warn!(
                        worker_id = %self.worker_id,
                        job_type = %self.job_type,
                        error = %e,
                        "Claim failed, backing off"
                    );
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.config.error_backoff) => {}
                    }
                }
            }
        }

        info!(worker_id = %self.worker_id, job_type = %self.job_type, "Worker stopped");
    }

    /// Claim and fully process at most one job. Returns whether a job was claimed.
    pub async fn tick(&self) -> DbResult<bool> {
        let Some(job) = self.db.claim_next_job(&self.job_type).await? else {
            return Ok(false);
        };
        record_claimed(&self.job_type);
        self.execute(job).await;
        Ok(true)
    }

    async fn execute(&self, job: Job) {
        let started = Instant::now();
        info!(
            worker_id = %self.worker_id,
            job_id = %job.id,
            job_type = %job.job_type,
            version = job.progress_version,
            "Job started"
        );

        let ctx = JobContext::new(job.id.clone(), self.db.clone());
        let handler = self.handler.clone();
        let payload = job.payload;

        // Own task so a panicking handler surfaces as a JoinError here.
        let outcome = tokio::spawn(async move { handler.run(payload, ctx).await }).await;

        let patch = match outcome {
            Ok(Ok(result)) => JobPatch::done(result),
            Ok(Err(e)) => {
                warn!(job_id = %job.id, error = %e, "Job failed");
                JobPatch::failed(e.to_string())
            }
            Err(join_err) => {
                error!(job_id = %job.id, error = %join_err, "Job handler panicked");
                JobPatch::failed("task panicked")
            }
        };

        let status = patch.status;
        if self.finalize(&job.id, &patch).await {
            let elapsed = started.elapsed();
            record_finished(&self.job_type, status, elapsed);
            info!(
                worker_id = %self.worker_id,
                job_id = %job.id,
                status = %status,
                duration_ms = elapsed.as_millis() as u64,
                "Job finished"
            );
        }
    }

    /// Write the terminal patch, retrying transient store errors.
    async fn finalize(&self, job_id: &str, patch: &JobPatch) -> bool {
        for attempt in 1..=FINALIZE_ATTEMPTS {
            match self.db.update_job(job_id, patch).await {
                Ok(_) => return true,
                Err(e) if e.is_transient() && attempt < FINALIZE_ATTEMPTS => {
                    warn!(job_id, attempt, error = %e, "Terminal write failed, retrying");
                    tokio::time::sleep(self.config.error_backoff).await;
                }
                Err(e) => {
                    error!(job_id, error = %e, "Could not record job outcome; job stays running");
                    return false;
                }
            }
        }
        false
    }
}

/// Start `loops_per_type` loops for every registered handler.
pub fn spawn_workers(state: &AppState) -> Vec<JoinHandle<()>> {
    let config = state.config.worker.clone();
    let mut handles = Vec::new();

    for job_type in state.handlers.job_types() {
        let Some(handler) = state.handlers.get(&job_type) else {
            continue;
        };
        let kick = state.kicks.signal(&job_type);
        for n in 0..config.loops_per_type {
            let worker = WorkerLoop::new(
                format!("{job_type}-{n}"),
                job_type.clone(),
                handler.clone(),
                state.db.clone(),
                kick.clone(),
                config.clone(),
                state.shutdown.clone(),
            );
            handles.push(tokio::spawn(worker.run()));
        }
    }

    info!(
        loops = handles.len(),
        job_types = ?state.handlers.job_types(),
        "Worker loops spawned"
    );
    handles
}

/// Wait for loops to exit after shutdown, bounded by `grace`.
pub async fn join_workers(handles: Vec<JoinHandle<()>>, grace: Duration) {
    let joined = tokio::time::timeout(grace, futures_util::future::join_all(handles)).await;
    match joined {
        Ok(results) => {
            for result in results {
                if let Err(e) = result {
                    error!(error = %e, "Worker loop exited abnormally");
                }
            }
        }
        Err(_) => warn!(grace_secs = grace.as_secs(), "Worker loops still busy at shutdown"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use jobline_core::{JobStatus, NewJob, TaskError};
    use serde_json::{json, Value};
    use tempfile::TempDir;

    use crate::jobs::handler::{EchoHandler, ECHO_JOB_TYPE};

    struct FailingHandler;

    #[async_trait]
    impl JobHandler for FailingHandler {
        async fn run(&self, _payload: Value, _ctx: JobContext) -> Result<Value, TaskError> {
            Err(TaskError::failed("boom"))
        }
    }

    struct PanickingHandler;

    #[async_trait]
    impl JobHandler for PanickingHandler {
        async fn run(&self, _payload: Value, _ctx: JobContext) -> Result<Value, TaskError> {
            panic!("handler bug");
        }
    }

    async fn file_db() -> (TempDir, Database) {
        let tmp = tempfile::tempdir().unwrap();
        let db = Database::new(&tmp.path().join("jobs.db")).await.unwrap();
        (tmp, db)
    }

    fn worker(
        db: &Database,
        handler: Arc<dyn JobHandler>,
        poll_interval: Duration,
    ) -> (WorkerLoop, Arc<Notify>, CancellationToken) {
        let kick = Arc::new(Notify::new());
        let shutdown = CancellationToken::new();
        let config = WorkerConfig {
            poll_interval,
            error_backoff: Duration::from_millis(50),
            loops_per_type: 1,
        };
        let worker = WorkerLoop::new(
            "test-0",
            ECHO_JOB_TYPE,
            handler,
            db.clone(),
            kick.clone(),
            config,
            shutdown.clone(),
        );
        (worker, kick, shutdown)
    }

    async fn enqueue(db: &Database, payload: Value) -> String {
        db.insert_job(&NewJob::new("user-1", ECHO_JOB_TYPE, payload))
            .await
            .unwrap()
            .id
    }

    async fn wait_terminal(db: &Database, job_id: &str) -> Job {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let job = db.get_job(job_id).await.unwrap();
                if job.status.is_terminal() {
                    return job;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("job should finish")
    }

    #[tokio::test]
    async fn test_tick_on_empty_queue() {
        let (_tmp, db) = file_db().await;
        let (worker, _, _) = worker(&db, Arc::new(EchoHandler), Duration::from_secs(1));
        assert!(!worker.tick().await.unwrap());
    }

    #[tokio::test]
    async fn test_successful_job_is_done() {
        let (_tmp, db) = file_db().await;
        let job_id = enqueue(&db, json!({ "text": "hello" })).await;
        let (worker, _, _) = worker(&db, Arc::new(EchoHandler), Duration::from_secs(1));

        assert!(worker.tick().await.unwrap());

        let job = db.get_job(&job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.snapshot, json!({ "text": "hello", "status": "done" }));
        // claim, two progress snapshots, terminal write
        assert_eq!(job.progress_version, 4);
        assert!(job.error_message.is_none());
    }

    #[tokio::test]
    async fn test_failing_job_records_error_in_snapshot() {
        let (_tmp, db) = file_db().await;
        let job_id = enqueue(&db, json!({})).await;
        let (worker, _, _) = worker(&db, Arc::new(FailingHandler), Duration::from_secs(1));

        assert!(worker.tick().await.unwrap());

        let job = db.get_job(&job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.error_message.as_deref(), Some("boom"));
        assert_eq!(
            job.snapshot,
            json!({ "status": "error", "stage": "error", "errorMessage": "boom" })
        );
        assert_eq!(job.progress_version, 2);
    }

    #[tokio::test]
    async fn test_panicking_handler_marks_job_failed() {
        let (_tmp, db) = file_db().await;
        let job_id = enqueue(&db, json!({})).await;
        let (worker, _, _) = worker(&db, Arc::new(PanickingHandler), Duration::from_secs(1));

        assert!(worker.tick().await.unwrap());

        let job = db.get_job(&job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.error_message.as_deref(), Some("task panicked"));
        assert_eq!(job.snapshot["status"], "error");
        assert_eq!(job.snapshot["errorMessage"], "task panicked");
    }

    #[tokio::test]
    async fn test_loop_continues_after_failure() {
        let (_tmp, db) = file_db().await;
        let failing = enqueue(&db, json!({ "fail": "bad input" })).await;
        let ok = enqueue(&db, json!({ "n": 2 })).await;

        let (worker, _, shutdown) = worker(&db, Arc::new(EchoHandler), Duration::from_millis(50));
        let handle = tokio::spawn(worker.run());

        let first = wait_terminal(&db, &failing).await;
        let second = wait_terminal(&db, &ok).await;
        assert_eq!(first.status, JobStatus::Error);
        assert_eq!(first.error_message.as_deref(), Some("bad input"));
        assert_eq!(second.status, JobStatus::Done);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_kick_wakes_idle_loop() {
        let (_tmp, db) = file_db().await;
        // Poll timer far beyond the test timeout: only the kick can wake it.
        let (worker, kick, shutdown) = worker(&db, Arc::new(EchoHandler), Duration::from_secs(600));
        let handle = tokio::spawn(worker.run());
        tokio::time::sleep(Duration::from_millis(100)).await;

        let job_id = enqueue(&db, json!({})).await;
        kick.notify_one();

        let job = wait_terminal(&db, &job_id).await;
        assert_eq!(job.status, JobStatus::Done);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_stops_idle_loop() {
        let (_tmp, db) = file_db().await;
        let (worker, _, shutdown) = worker(&db, Arc::new(EchoHandler), Duration::from_secs(600));
        let handle = tokio::spawn(worker.run());
        tokio::time::sleep(Duration::from_millis(50)).await;

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop should exit promptly")
            .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_lets_in_flight_job_finish() {
        let (_tmp, db) = file_db().await;
        let job_id = enqueue(&db, json!({ "delayMs": 200 })).await;
        let (worker, _, shutdown) = worker(&db, Arc::new(EchoHandler), Duration::from_millis(20));
        let handle = tokio::spawn(worker.run());

        tokio::time::timeout(Duration::from_secs(5), async {
            while db.get_job(&job_id).await.unwrap().status != JobStatus::Running {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        shutdown.cancel();
        handle.await.unwrap();

        let job = db.get_job(&job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Done);
    }
}
