use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

/// Serves CPU load and concurrency time series over HTTP
#[derive(Parser, Debug, Clone)]
#[command(name = "sky_metrics", version)]
#[command(about = "Serve CPU load and concurrency time series over HTTP")]
pub struct Config {
    /// Path of the DuckDB database file, or ":memory:"
    #[arg(long, env = "SKY_DB_PATH", default_value = "sky.duckdb")]
    pub db_path: String,

    /// Table holding the metric samples
    #[arg(long, env = "SKY_TABLE_NAME", default_value = "metrics")]
    pub table_name: String,

    /// Address the HTTP server binds to
    #[arg(long, env = "SKY_LISTEN_ADDR", default_value = "127.0.0.1:8080")]
    pub listen_addr: SocketAddr,

    /// Time budget for a single aggregation, in milliseconds
    #[arg(long, env = "SKY_QUERY_TIMEOUT_MS", default_value = "2000")]
    pub query_timeout_ms: u64,

    /// Time budget for a whole HTTP request, in seconds
    #[arg(long, env = "SKY_REQUEST_TIMEOUT_SECS", default_value = "15")]
    pub request_timeout_secs: u64,

    /// Statements allowed to run against the database at once
    #[arg(long, env = "SKY_MAX_CONCURRENT_QUERIES", default_value = "8")]
    pub max_concurrent_queries: usize,

    /// Samples older than this many days are purged; 0 keeps everything
    #[arg(long, env = "SKY_RETENTION_DAYS", default_value = "3650")]
    pub retention_days: u32,

    /// Default log level; RUST_LOG takes precedence when set
    #[arg(long, env = "SKY_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retention(&self) -> Option<chrono::Duration> {
        match self.retention_days {
            0 => None,
            days => Some(chrono::Duration::days(i64::from(days))),
        }
    }
}
