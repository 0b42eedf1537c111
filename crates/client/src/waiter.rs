//! Poll a job until it reaches `done` or `error`.

use std::time::Duration;

use jobline_core::{JobSource, JobView, SourceError};
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct WaitOptions {
    /// Give up after this long.
    pub timeout: Duration,
    /// First delay between reads.
    pub min_interval: Duration,
    /// Delay ceiling.
    pub max_interval: Duration,
    /// Delay multiplier after a read that found the job still in progress.
    pub success_growth: f64,
    /// Delay multiplier after a failed read.
    pub failure_growth: f64,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(8 * 60),
            min_interval: Duration::from_millis(400),
            max_interval: Duration::from_millis(2000),
            success_growth: 1.2,
            failure_growth: 1.35,
        }
    }
}

#[derive(Debug, Error)]
pub enum WaitError {
    #[error("timed out after {0:?} waiting for job")]
    Timeout(Duration),

    #[error("wait aborted")]
    Aborted,

    #[error("job not found: {0}")]
    NotFound(String),

    #[error("access to job {0} is forbidden")]
    Forbidden(String),

    #[error("not authenticated")]
    Unauthorized,
}

fn grow(interval: Duration, factor: f64, max: Duration) -> Duration {
    Duration::from_secs_f64(interval.as_secs_f64() * factor).min(max)
}

/// Poll `source` until the job is terminal and return its final view.
///
/// Reads that fail transiently are retried with a faster-growing delay.
/// Missing, forbidden and unauthenticated reads fail at once. Cancelling
/// `cancel` aborts immediately, including mid-read and mid-sleep.
pub async fn wait_for_job<S>(
    source: &S,
    job_id: &str,
    options: &WaitOptions,
    cancel: &CancellationToken,
) -> Result<JobView, WaitError>
where
    S: JobSource + ?Sized,
{
    let started = Instant::now();
    let deadline = started + options.timeout;
    let mut interval = options.min_interval;

    loop {
        if cancel.is_cancelled() {
            return Err(WaitError::Aborted);
        }
        if Instant::now() >= deadline {
            return Err(WaitError::Timeout(started.elapsed()));
        }

        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(WaitError::Aborted),
            read = tokio::time::timeout_at(deadline, source.fetch_job(job_id)) => match read {
                Ok(read) => read,
                Err(_) => return Err(WaitError::Timeout(started.elapsed())),
            },
        };

        let growth = match read {
            Ok(view) if view.is_terminal() => return Ok(view),
            Ok(view) => {
                debug!(job_id, status = %view.status, next_ms = interval.as_millis() as u64, "Job still in progress");
                options.success_growth
            }
            Err(SourceError::Transient(reason)) => {
                debug!(job_id, %reason, next_ms = interval.as_millis() as u64, "Job read failed, retrying");
                options.failure_growth
            }
            Err(SourceError::NotFound(id)) => return Err(WaitError::NotFound(id)),
            Err(SourceError::Forbidden(id)) => return Err(WaitError::Forbidden(id)),
            Err(SourceError::Unauthorized) => return Err(WaitError::Unauthorized),
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(WaitError::Aborted),
            _ = tokio::time::sleep(interval.min(remaining)) => {}
        }
        interval = grow(interval, growth, options.max_interval);
    }
}
