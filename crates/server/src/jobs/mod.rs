// crates/server/src/jobs/mod.rs
//! Background job execution and progress delivery.
//!
//! - `WorkerLoop`: claims queued jobs of one type and runs their handler
//! - `KickRegistry`: best-effort wake-ups for idle loops
//! - `HandlerRegistry` / `JobHandler`: the work behind each job type
//! - `job_events`: SSE progress stream with `Last-Event-ID` resume

pub mod handler;
pub mod kick;
pub mod stream;
pub mod worker;

pub use handler::{EchoHandler, HandlerRegistry, JobContext, JobHandler, ECHO_JOB_TYPE};
pub use kick::KickRegistry;
pub use stream::{job_events, last_event_id};
pub use worker::{join_workers, spawn_workers, WorkerLoop};
