//! Client-side helpers for jobline jobs.
//!
//! `wait_for_job` polls any [`JobSource`](jobline_core::JobSource) until the
//! job finishes; `HttpJobSource` is the source for callers outside the
//! server process.

pub mod http;
pub mod waiter;

pub use http::{ClientError, HttpJobSource};
pub use waiter::{wait_for_job, WaitError, WaitOptions};
