// crates/server/src/config.rs
//! Runtime configuration, read from the environment with in-code defaults.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Default port for the server.
pub const DEFAULT_PORT: u16 = 47900;

/// Header carrying the authenticated caller id, set by the fronting proxy.
pub const DEFAULT_AUTH_HEADER: &str = "x-user-id";

/// Worker loop timing.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Idle wait between claim attempts when no kick arrives.
    pub poll_interval: Duration,
    /// Pause after a store error while claiming.
    pub error_backoff: Duration,
    /// Concurrent loops started per registered job type.
    pub loops_per_type: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            error_backoff: Duration::from_secs(1),
            loops_per_type: 1,
        }
    }
}

/// Progress stream timing.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub poll_interval: Duration,
    pub ping_interval: Duration,
    /// Reconnect hint sent as the first `retry:` line.
    pub retry: Duration,
    pub error_backoff: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            ping_interval: Duration::from_secs(15),
            retry: Duration::from_millis(2000),
            error_backoff: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    /// `None` means the default path under the user cache dir.
    pub db_path: Option<PathBuf>,
    pub auth_header: String,
    pub worker: WorkerConfig,
    pub stream: StreamConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            db_path: None,
            auth_header: DEFAULT_AUTH_HEADER.to_string(),
            worker: WorkerConfig::default(),
            stream: StreamConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Build from the process environment. Unparseable values fall back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let millis = |key: &str| get(key).and_then(|v| v.parse::<u64>().ok()).map(Duration::from_millis);

        Self {
            host: get("JOBLINE_HOST")
                .and_then(|h| h.parse().ok())
                .unwrap_or(defaults.host),
            port: get("JOBLINE_PORT")
                .or_else(|| get("PORT"))
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            db_path: get("JOBLINE_DB_PATH").map(PathBuf::from),
            auth_header: get("JOBLINE_AUTH_HEADER")
                .map(|h| h.to_ascii_lowercase())
                .unwrap_or(defaults.auth_header),
            worker: WorkerConfig {
                poll_interval: millis("JOBLINE_WORKER_POLL_MS")
                    .unwrap_or(defaults.worker.poll_interval),
                loops_per_type: get("JOBLINE_WORKER_LOOPS")
                    .and_then(|n| n.parse::<usize>().ok())
                    .filter(|n| *n > 0)
                    .unwrap_or(defaults.worker.loops_per_type),
                ..defaults.worker
            },
            stream: StreamConfig {
                poll_interval: millis("JOBLINE_STREAM_POLL_MS")
                    .unwrap_or(defaults.stream.poll_interval),
                ping_interval: get("JOBLINE_PING_SECS")
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.stream.ping_interval),
                retry: millis("JOBLINE_RETRY_MS").unwrap_or(defaults.stream.retry),
                ..defaults.stream
            },
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
