//! Default storage locations.

use std::path::PathBuf;

/// App cache root: `~/Library/Caches/jobline/` (macOS) or `~/.cache/jobline/` (Linux).
pub fn app_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|d| d.join("jobline"))
}

/// SQLite database file: `<app_cache_dir>/jobline.db`.
pub fn db_path() -> Option<PathBuf> {
    app_cache_dir().map(|d| d.join("jobline.db"))
}

/// Rolling log directory: `<app_cache_dir>/logs/`.
pub fn log_dir() -> Option<PathBuf> {
    app_cache_dir().map(|d| d.join("logs"))
}
