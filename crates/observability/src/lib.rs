//! Tracing setup shared by jobline binaries.
//!
//! Logs go to stderr (compact or JSON) and, when a log directory is
//! configured, to a daily rolling JSON file. `RUST_LOG` overrides the
//! default filter.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

pub const DEFAULT_FILTER: &str = "warn,jobline=info,jobline_server=info,jobline_db=info";

const LOG_FILE_PREFIX: &str = "jobline.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" | "text" | "pretty" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Directory for the rolling log file. `None` logs to stderr only.
    pub log_dir: Option<PathBuf>,
    /// Filter used when `RUST_LOG` is unset or invalid.
    pub default_filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Compact,
            log_dir: None,
            default_filter: DEFAULT_FILTER.to_string(),
        }
    }
}

impl LogConfig {
    /// `JOBLINE_LOG_FORMAT` and `JOBLINE_LOG_DIR`.
    ///
    /// An unset `JOBLINE_LOG_DIR` logs to [`default_log_dir`]; `off` (or an
    /// empty value) disables the file log.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            format: get("JOBLINE_LOG_FORMAT")
                .and_then(|f| f.parse().ok())
                .unwrap_or_default(),
            log_dir: match get("JOBLINE_LOG_DIR") {
                None => default_log_dir(),
                Some(dir) if dir.trim().is_empty() || dir.trim().eq_ignore_ascii_case("off") => None,
                Some(dir) => Some(PathBuf::from(dir)),
            },
            ..Self::default()
        }
    }
}

/// Install the global subscriber.
///
/// Keep the returned guard alive for the life of the process: dropping it
/// flushes and stops the file writer.
pub fn init_tracing(config: &LogConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let stderr_layer = match config.format {
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(false)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("installing global tracing subscriber")?;

    Ok(guard)
}

/// Default log directory under the user cache dir.
pub fn default_log_dir() -> Option<PathBuf> {
    jobline_core::paths::log_dir()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(" JSON ".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_config_from_env() {
        let config = LogConfig::from_lookup(lookup(&[
            ("JOBLINE_LOG_FORMAT", "json"),
            ("JOBLINE_LOG_DIR", "/var/log/jobline"),
        ]));
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.log_dir, Some(PathBuf::from("/var/log/jobline")));
        assert_eq!(config.default_filter, DEFAULT_FILTER);

        let config = LogConfig::from_lookup(lookup(&[("JOBLINE_LOG_FORMAT", "yaml")]));
        assert_eq!(config.format, LogFormat::Compact);
        assert_eq!(config.log_dir, default_log_dir());
    }

    #[test]
    fn test_file_log_can_be_disabled() {
        let config = LogConfig::from_lookup(lookup(&[("JOBLINE_LOG_DIR", "off")]));
        assert!(config.log_dir.is_none());

        let config = LogConfig::from_lookup(lookup(&[("JOBLINE_LOG_DIR", "  ")]));
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn test_init_tracing_once() {
        let tmp = tempfile::tempdir().unwrap();
        let config = LogConfig {
            log_dir: Some(tmp.path().join("logs")),
            ..LogConfig::default()
        };

        let guard = init_tracing(&config).expect("first init succeeds");
        assert!(guard.is_some());
        assert!(tmp.path().join("logs").is_dir());

        assert!(init_tracing(&LogConfig::default()).is_err());
    }
}
