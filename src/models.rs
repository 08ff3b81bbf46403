use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::MetricsError;

/// The metric fields a query is scoped to. `None` selects every known field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum MetricType {
    #[default]
    None,
    CpuLoad,
    Concurrency,
}

impl MetricType {
    pub fn includes_cpu_load(self) -> bool {
        match self {
            MetricType::None | MetricType::CpuLoad => true,
            MetricType::Concurrency => false,
        }
    }

    pub fn includes_concurrency(self) -> bool {
        match self {
            MetricType::None | MetricType::Concurrency => true,
            MetricType::CpuLoad => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MetricType::None => "all",
            MetricType::CpuLoad => "cpu_load",
            MetricType::Concurrency => "concurrency",
        }
    }
}

impl FromStr for MetricType {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Ok(MetricType::None),
            "cpu_load" => Ok(MetricType::CpuLoad),
            "concurrency" => Ok(MetricType::Concurrency),
            other => Err(MetricsError::InvalidMetricType(other.to_string())),
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Granularity a series is averaged over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Frequency {
    #[default]
    None,
    Seconds,
    Minutes,
    Hours,
    Days,
    Months,
    Years,
}

impl Frequency {
    /// Returns the bucket a series must be aggregated into, or `None` when the
    /// stored (minute) resolution already satisfies the frequency.
    pub fn bucket_unit(self) -> Option<BucketUnit> {
        match self {
            Frequency::None | Frequency::Seconds | Frequency::Minutes => None,
            Frequency::Hours => Some(BucketUnit::Hour),
            Frequency::Days => Some(BucketUnit::Day),
            Frequency::Months => Some(BucketUnit::Month),
            Frequency::Years => Some(BucketUnit::Year),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::None => "none",
            Frequency::Seconds => "seconds",
            Frequency::Minutes => "minutes",
            Frequency::Hours => "hours",
            Frequency::Days => "days",
            Frequency::Months => "months",
            Frequency::Years => "years",
        }
    }
}

impl FromStr for Frequency {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Ok(Frequency::None),
            "seconds" => Ok(Frequency::Seconds),
            "minutes" => Ok(Frequency::Minutes),
            "hours" => Ok(Frequency::Hours),
            "days" => Ok(Frequency::Days),
            "months" => Ok(Frequency::Months),
            "years" => Ok(Frequency::Years),
            other => Err(MetricsError::InvalidFrequency(other.to_string())),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Truncation unit applied to timestamps before grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BucketUnit {
    Hour,
    Day,
    Month,
    Year,
}

impl BucketUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            BucketUnit::Hour => "hour",
            BucketUnit::Day => "day",
            BucketUnit::Month => "month",
            BucketUnit::Year => "year",
        }
    }
}

/// Parameters a metric lookup is executed with. Built once per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub metric_type: MetricType,
    pub frequency: Frequency,
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{start: {}, end: {}, type: {}, frequency: {}}}",
            self.start_at.to_rfc3339(),
            self.end_at.to_rfc3339(),
            self.metric_type,
            self.frequency
        )
    }
}

/// A single stored sample. Absent fields were not recorded for the sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_load: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<i64>,
}

/// Mean of each requested field over a time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricAverage {
    #[serde(rename = "start")]
    pub start_time: DateTime<Utc>,
    #[serde(rename = "end")]
    pub end_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_load: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<f64>,
}
