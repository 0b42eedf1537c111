// crates/core/src/error.rs
use thiserror::Error;

/// Failure reported by a domain task handler.
///
/// The worker absorbs it into the job record (`status = error`); it never
/// crosses the job boundary.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TaskError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Errors from reading a job through a [`crate::JobSource`].
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Access to job {0} is forbidden")]
    Forbidden(String),

    #[error("Caller is not authenticated")]
    Unauthorized,

    /// Network hiccups, 5xx responses, store contention. Safe to retry.
    #[error("Transient read failure: {0}")]
    Transient(String),
}

impl SourceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Transient(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_error_display() {
        assert_eq!(TaskError::failed("no video url").to_string(), "no video url");

        let bad = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(TaskError::from(bad).to_string().starts_with("invalid payload"));
    }

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(SourceError::Transient("503".into()).is_transient());
        assert!(!SourceError::NotFound("j".into()).is_transient());
        assert!(!SourceError::Forbidden("j".into()).is_transient());
        assert!(!SourceError::Unauthorized.is_transient());
    }
}
