//! API route handlers for the jobline server.

pub mod health;
pub mod jobs;
pub mod metrics;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined router.
///
/// Routes:
/// - GET  /api/health - Health check
/// - POST /api/jobs - Enqueue a job
/// - GET  /api/jobs - Caller's jobs, newest first
/// - GET  /api/jobs/{id} - Current view of one job
/// - GET  /api/jobs/{id}/events - SSE progress stream
/// - GET  /metrics - Prometheus metrics
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", health::router().merge(jobs::router()))
        .merge(metrics::router())
        .with_state(state)
}
