// crates/server/src/jobs/stream.rs
//! Server-sent progress for a single job.
//!
//! The stream polls the store rather than subscribing to anything, so it
//! works across processes and resumes from any `Last-Event-ID`. Each data
//! frame carries the full job view with `id: <progressVersion>`; a frame is
//! only sent when the version moves past the client's cursor.

use std::convert::Infallible;
use std::time::Instant;

use axum::http::HeaderMap;
use axum::response::sse::Event;
use jobline_core::Job;
use jobline_db::{Database, DbError};
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

use crate::config::StreamConfig;
use crate::metrics::StreamGauge;

/// Parse `Last-Event-ID` as a non-negative version. Anything else is ignored.
pub fn last_event_id(headers: &HeaderMap) -> Option<i64> {
    headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|v| *v >= 0)
}

fn job_frame(job: &Job) -> Event {
    let data = serde_json::to_string(&job.view()).unwrap_or_default();
    Event::default()
        .id(job.progress_version.to_string())
        .data(data)
}

/// Progress events for `job`, already loaded and owned by `owner`.
///
/// Ends when the job is terminal, disappears or changes owner, or when
/// `shutdown` fires. Dropping the stream (client disconnect) ends it at the
/// next await point.
pub fn job_events(
    db: Database,
    job: Job,
    owner: String,
    cursor: Option<i64>,
    config: StreamConfig,
    shutdown: CancellationToken,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        let _gauge = StreamGauge::open();
        let job_id = job.id.clone();

        yield Ok(Event::default().retry(config.retry));

        // A cursor past the stored version did not come from this job's
        // history; start over from the current state.
        let mut cursor = cursor.filter(|seen| *seen <= job.progress_version);
        if cursor.map_or(true, |seen| job.progress_version > seen) {
            yield Ok(job_frame(&job));
            cursor = Some(job.progress_version);
        }

        let mut last_ping = Instant::now();
        let mut done = job.status.is_terminal();
        while !done {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(config.poll_interval) => {}
            }

            if last_ping.elapsed() >= config.ping_interval {
                yield Ok(Event::default().comment("ping"));
                last_ping = Instant::now();
            }

            let current = match db.get_job(&job_id).await {
                Ok(current) => current,
                Err(DbError::NotFound(_)) => {
                    tracing::debug!(job_id = %job_id, "Job vanished, closing stream");
                    break;
                }
                Err(e) => {
                    tracing::warn!(job_id = %job_id, error = %e, "Stream read failed, retrying");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(config.error_backoff) => {}
                    }
                    continue;
                }
            };

            if !current.is_owned_by(&owner) {
                tracing::warn!(job_id = %job_id, "Job owner changed, closing stream");
                break;
            }

            if cursor.map_or(true, |seen| current.progress_version > seen) {
                yield Ok(job_frame(&current));
                cursor = Some(current.progress_version);
            }
            done = current.status.is_terminal();
        }
        tracing::debug!(job_id = %job_id, "Stream closed");
    }
}
