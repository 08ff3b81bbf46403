use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use crate::models::{Frequency, MetricType, Query};
use crate::{MetricsError, Result};

/// Raw query-string parameters of a metrics request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryParams {
    pub start: Option<String>,
    pub end: Option<String>,
    pub frequency: Option<String>,
}

/// Validates raw request parameters and turns them into a [`Query`].
///
/// `metric_type` is the path segment of the request, if any. Checks run in a
/// fixed order (time range, `start`, `end`, `frequency`, type) and the first
/// failure is returned.
pub fn build_query(params: &QueryParams, metric_type: Option<&str>) -> Result<Query> {
    let start = non_empty(params.start.as_deref());
    let end = non_empty(params.end.as_deref());
    let (start, end) = match (start, end) {
        (Some(start), Some(end)) => (start, end),
        _ => return Err(MetricsError::MissingTimeRange),
    };

    let start_at = parse_epoch("start", start)?;
    let end_at = parse_epoch("end", end)?;

    let frequency: Frequency = params.frequency.as_deref().unwrap_or_default().parse()?;
    let metric_type: MetricType = metric_type.unwrap_or_default().parse()?;

    Ok(Query {
        start_at,
        end_at,
        metric_type,
        frequency,
    })
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn parse_epoch(field: &'static str, value: &str) -> Result<DateTime<Utc>> {
    let invalid = || MetricsError::InvalidTimestamp {
        field,
        value: value.to_string(),
    };

    let seconds: i64 = value.parse().map_err(|_| invalid())?;
    Utc.timestamp_opt(seconds, 0).single().ok_or_else(invalid)
}
