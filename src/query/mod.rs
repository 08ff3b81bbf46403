//! Turns request parameters into [`Query`](crate::models::Query) values and
//! runs them against a backend.

pub mod engine;
pub mod filter;

pub use engine::{MetricQueryEngine, DEFAULT_AGGREGATE_TIMEOUT};
pub use filter::{build_query, QueryParams};
