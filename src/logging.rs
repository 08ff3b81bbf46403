use tracing_subscriber::{
    fmt,
    EnvFilter,
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::{MetricsError, Result};

/// Sets up the logging subscriber for the application.
///
/// # Arguments
/// * `default_level` - Level used for this crate and tower-http when `RUST_LOG` is unset
pub fn init_logger(default_level: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{crate_name}={level},tower_http={level}",
                crate_name = env!("CARGO_CRATE_NAME"),
                level = default_level
            ))
        });

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .with_ansi(true)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| MetricsError::Internal(format!("Failed to initialize logger: {}", e)))
}
