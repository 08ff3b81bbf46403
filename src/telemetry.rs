use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder, HistogramVec,
    IntCounter, IntCounterVec, TextEncoder,
};
use std::time::Instant;

lazy_static! {
    // Query metrics
    pub static ref QUERIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "sky_queries_total",
        "Total number of metric queries executed",
        &["operation", "strategy"]
    ).unwrap();

    pub static ref QUERY_DURATION: HistogramVec = register_histogram_vec!(
        "sky_query_duration_seconds",
        "Query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]
    ).unwrap();

    pub static ref QUERY_TIMEOUTS: IntCounter = register_int_counter!(
        "sky_query_timeouts_total",
        "Total number of aggregations that exceeded their time budget"
    ).unwrap();

    pub static ref EMPTY_RESULTS: IntCounterVec = register_int_counter_vec!(
        "sky_empty_results_total",
        "Total number of queries that matched no data",
        &["operation"]
    ).unwrap();

    // Storage metrics
    pub static ref STORAGE_OPERATIONS: IntCounter = register_int_counter!(
        "sky_storage_operations_total",
        "Total number of storage operations"
    ).unwrap();
}

/// Observes the lifetime of a query into [`QUERY_DURATION`] when dropped.
pub struct QueryTimer {
    operation: &'static str,
    start: Instant,
}

impl QueryTimer {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for QueryTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        QUERY_DURATION
            .with_label_values(&[self.operation])
            .observe(duration);
    }
}

pub fn record_query(operation: &str, strategy: &str) {
    QUERIES_TOTAL.with_label_values(&[operation, strategy]).inc();
}

pub fn record_timeout() {
    QUERY_TIMEOUTS.inc();
}

pub fn record_empty_result(operation: &str) {
    EMPTY_RESULTS.with_label_values(&[operation]).inc();
}

pub fn record_storage_operation() {
    STORAGE_OPERATIONS.inc();
}

/// Renders the default registry in the Prometheus text format.
pub fn render() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!("Failed to encode telemetry: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
