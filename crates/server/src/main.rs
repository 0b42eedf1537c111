// crates/server/src/main.rs
//! Jobline server binary.
//!
//! Opens the job store, starts one worker loop set per registered job type,
//! then serves the HTTP API until Ctrl-C. On shutdown the listener stops
//! accepting, open progress streams end, and worker loops finish their
//! in-flight job before exiting.

use std::time::Duration;

use anyhow::{Context, Result};
use jobline_db::Database;
use jobline_observability::{init_tracing, LogConfig};
use jobline_server::jobs::{join_workers, ECHO_JOB_TYPE};
use jobline_server::{
    create_app, init_metrics, spawn_workers, AppState, EchoHandler, HandlerRegistry, ServerConfig,
};

/// How long shutdown waits for busy worker loops.
const WORKER_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = init_tracing(&LogConfig::from_env())?;
    init_metrics();

    let config = ServerConfig::from_env();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting jobline");

    let db = match &config.db_path {
        Some(path) => Database::new(path).await,
        None => Database::open_default().await,
    }
    .context("opening job database")?;

    // Nothing reclaims these; they stay running until an operator acts.
    match db.find_stalled_jobs(Duration::ZERO).await {
        Ok(stalled) if !stalled.is_empty() => {
            let ids: Vec<&str> = stalled.iter().map(|j| j.id.as_str()).collect();
            tracing::warn!(count = stalled.len(), ?ids, "Jobs left running by a previous process");
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Failed to check for stalled jobs"),
    }

    let handlers = HandlerRegistry::new().with(ECHO_JOB_TYPE, EchoHandler);
    let addr = config.socket_addr();
    let state = AppState::new(db, handlers, config);

    let workers = spawn_workers(&state);
    let app = create_app(state.clone());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, db = %state.db.db_path().display(), "Listening");

    let shutdown = state.shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            }
            tracing::info!("Shutdown requested");
            // Ends open SSE streams so graceful shutdown is not held open by them.
            shutdown.cancel();
        })
        .await
        .context("serving HTTP")?;

    state.shutdown.cancel();
    join_workers(workers, WORKER_SHUTDOWN_GRACE).await;
    tracing::info!("Stopped");
    Ok(())
}
