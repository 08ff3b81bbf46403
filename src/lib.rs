pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod query;
pub mod store;
pub mod telemetry;

pub use error::{MetricsError, Result};
