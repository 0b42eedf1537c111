//! Read-only access to job state for pollers.

use async_trait::async_trait;

use crate::error::SourceError;
use crate::job::JobView;

/// Anything that can report the current view of a job by id.
///
/// Implemented by the database handle (in-process callers) and by the HTTP
/// client (out-of-process callers hitting the polling endpoint).
#[async_trait]
pub trait JobSource: Send + Sync {
    async fn fetch_job(&self, job_id: &str) -> Result<JobView, SourceError>;
}
