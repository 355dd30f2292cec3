//! Application configuration loaded from environment variables.

use std::path::PathBuf;

use saga_log::DEFAULT_CAPACITY;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `SAGA_LOG_PATH` — JSONL file for saga log persistence (default: off)
/// - `SAGA_LOG_CAPACITY` — in-memory saga log bound (default: `10000`)
/// - `MONITOR_INTERVAL_SECS` — metrics collection period (default: `10`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub saga_log_path: Option<PathBuf>,
    pub saga_log_capacity: usize,
    pub monitor_interval_secs: u64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            saga_log_path: std::env::var("SAGA_LOG_PATH").ok().map(PathBuf::from),
            saga_log_capacity: std::env::var("SAGA_LOG_CAPACITY")
                .ok()
                .and_then(|c| c.parse().ok())
                .unwrap_or(DEFAULT_CAPACITY),
            monitor_interval_secs: std::env::var("MONITOR_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            saga_log_path: None,
            saga_log_capacity: DEFAULT_CAPACITY,
            monitor_interval_secs: 10,
        }
    }
}
