// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use jobline_db::Database;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::jobs::{HandlerRegistry, KickRegistry};

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// Job store.
    pub db: Database,
    /// Wake-up signals for idle worker loops, one per job type.
    pub kicks: Arc<KickRegistry>,
    /// Registered job types. Enqueueing an unregistered type is rejected.
    pub handlers: Arc<HandlerRegistry>,
    pub config: ServerConfig,
    /// Fired on shutdown; stops worker loops and open progress streams.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Create a new application state wrapped in an Arc for sharing.
    pub fn new(db: Database, handlers: HandlerRegistry, config: ServerConfig) -> Arc<Self> {
        Arc::new(Self {
            start_time: Instant::now(),
            db,
            kicks: Arc::new(KickRegistry::new()),
            handlers: Arc::new(handlers),
            config,
            shutdown: CancellationToken::new(),
        })
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
