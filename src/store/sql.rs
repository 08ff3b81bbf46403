//! SQL text for the DuckDB backend.
//!
//! Every statement that matches a range takes two parameters: the inclusive
//! start and end bound as epoch milliseconds. Timestamps come back as epoch
//! milliseconds too.

use crate::models::{BucketUnit, MetricType};
use crate::{MetricsError, Result};

const RANGE_PREDICATE: &str =
    "\"timestamp\" BETWEEN epoch_ms(CAST(? AS BIGINT)) AND epoch_ms(CAST(? AS BIGINT))";

/// Accepts plain identifiers only, since table names are interpolated.
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(MetricsError::Config(format!(
            "table name must be a plain identifier, got {:?}",
            name
        )))
    }
}

pub fn create_table(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            \"timestamp\" TIMESTAMP NOT NULL,
            cpu_load DOUBLE,
            concurrency BIGINT
        );
        CREATE INDEX IF NOT EXISTS {table}_timestamp_idx ON {table} (\"timestamp\");"
    )
}

pub fn insert_sample(table: &str) -> String {
    format!(
        "INSERT INTO {table} (\"timestamp\", cpu_load, concurrency)
         VALUES (epoch_ms(CAST(? AS BIGINT)), ?, ?)"
    )
}

/// Takes one parameter: the exclusive cutoff as epoch milliseconds.
pub fn delete_before(table: &str) -> String {
    format!("DELETE FROM {table} WHERE \"timestamp\" < epoch_ms(CAST(? AS BIGINT))")
}

/// Columns: `ts`, `cpu_load`, `concurrency`.
pub fn range_scan(table: &str, metric_type: MetricType) -> String {
    let cpu_load = if metric_type.includes_cpu_load() {
        "cpu_load"
    } else {
        "CAST(NULL AS DOUBLE)"
    };
    let concurrency = if metric_type.includes_concurrency() {
        "concurrency"
    } else {
        "CAST(NULL AS BIGINT)"
    };

    format!(
        "SELECT epoch_ms(\"timestamp\") AS ts, {cpu_load} AS cpu_load, {concurrency} AS concurrency
         FROM {table}
         WHERE {RANGE_PREDICATE}
         ORDER BY \"timestamp\" ASC"
    )
}

/// Columns: `bucket`, `cpu_load`, `concurrency` (both averages as DOUBLE).
pub fn bucketed_average(table: &str, unit: BucketUnit, metric_type: MetricType) -> String {
    let (cpu_load, concurrency) = averaged_columns(metric_type);
    let unit = unit.as_str();

    format!(
        "SELECT epoch_ms(date_trunc('{unit}', \"timestamp\")) AS bucket,
                {cpu_load} AS cpu_load,
                {concurrency} AS concurrency
         FROM {table}
         WHERE {RANGE_PREDICATE}
         GROUP BY bucket
         ORDER BY bucket ASC"
    )
}

/// Columns: `samples`, `first_ts`, `last_ts`, `cpu_load`, `concurrency`.
/// Always yields a single row; `samples` is zero when nothing matched.
pub fn whole_range_average(table: &str, metric_type: MetricType) -> String {
    let (cpu_load, concurrency) = averaged_columns(metric_type);

    format!(
        "SELECT count(*) AS samples,
                epoch_ms(min(\"timestamp\")) AS first_ts,
                epoch_ms(max(\"timestamp\")) AS last_ts,
                {cpu_load} AS cpu_load,
                {concurrency} AS concurrency
         FROM {table}
         WHERE {RANGE_PREDICATE}"
    )
}

fn averaged_columns(metric_type: MetricType) -> (&'static str, &'static str) {
    match metric_type {
        MetricType::None => ("avg(cpu_load)", "avg(concurrency)"),
        MetricType::CpuLoad => ("avg(cpu_load)", "CAST(NULL AS DOUBLE)"),
        MetricType::Concurrency => ("CAST(NULL AS DOUBLE)", "avg(concurrency)"),
    }
}
