// crates/core/src/lib.rs
//! Shared types for the jobline job subsystem.

pub mod error;
pub mod job;
pub mod paths;
pub mod source;

pub use error::{SourceError, TaskError};
pub use job::{
    new_job_id, EnqueuedJob, Job, JobId, JobPatch, JobStatus, JobView, NewJob, UnknownStatus,
};
pub use source::JobSource;
