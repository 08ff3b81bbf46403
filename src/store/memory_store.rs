//! In-process sample store.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use tokio::sync::RwLock as AsyncRwLock;

use super::{MetricBackend, TimeRange};
use crate::models::{BucketUnit, Metric, MetricAverage, MetricType};
use crate::{MetricsError, Result};

/// Keeps samples in a vector and evaluates every operation in memory, with
/// the same truncation and averaging rules as the DuckDB store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    samples: Arc<AsyncRwLock<Vec<Metric>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_samples(samples: Vec<Metric>) -> Self {
        Self {
            samples: Arc::new(AsyncRwLock::new(samples)),
        }
    }

    pub async fn insert_metrics(&self, samples: Vec<Metric>) -> usize {
        let count = samples.len();
        self.samples.write().await.extend(samples);
        count
    }

    async fn matching(&self, range: TimeRange) -> Vec<Metric> {
        let samples = self.samples.read().await;
        let mut matched: Vec<Metric> = samples
            .iter()
            .filter(|m| range.contains(m.timestamp))
            .cloned()
            .collect();
        matched.sort_by_key(|m| m.timestamp);
        matched
    }
}

#[async_trait]
impl MetricBackend for MemoryStore {
    async fn ensure_schema_ready(&self) -> Result<()> {
        Ok(())
    }

    async fn range_query(&self, range: TimeRange, metric_type: MetricType) -> Result<Vec<Metric>> {
        Ok(self
            .matching(range)
            .await
            .into_iter()
            .map(|m| project(m, metric_type))
            .collect())
    }

    async fn bucketed_aggregate(
        &self,
        range: TimeRange,
        unit: BucketUnit,
        metric_type: MetricType,
    ) -> Result<Vec<Metric>> {
        let mut buckets: BTreeMap<DateTime<Utc>, Accumulator> = BTreeMap::new();
        for sample in self.matching(range).await {
            buckets
                .entry(truncate(sample.timestamp, unit)?)
                .or_default()
                .add(&sample);
        }

        Ok(buckets
            .into_iter()
            .map(|(timestamp, acc)| {
                let (cpu_load, concurrency) = acc.means(metric_type);
                Metric {
                    timestamp,
                    cpu_load,
                    concurrency: concurrency.map(|mean| mean.trunc() as i64),
                }
            })
            .collect())
    }

    async fn whole_range_aggregate(
        &self,
        range: TimeRange,
        metric_type: MetricType,
    ) -> Result<Vec<MetricAverage>> {
        let matched = self.matching(range).await;
        let (first, last) = match (matched.first(), matched.last()) {
            (Some(first), Some(last)) => (first.timestamp, last.timestamp),
            _ => return Ok(Vec::new()),
        };

        let mut acc = Accumulator::default();
        for sample in &matched {
            acc.add(sample);
        }
        let (cpu_load, concurrency) = acc.means(metric_type);

        Ok(vec![MetricAverage {
            start_time: first,
            end_time: last,
            cpu_load,
            concurrency,
        }])
    }
}

fn project(mut metric: Metric, metric_type: MetricType) -> Metric {
    if !metric_type.includes_cpu_load() {
        metric.cpu_load = None;
    }
    if !metric_type.includes_concurrency() {
        metric.concurrency = None;
    }
    metric
}

/// Start of the bucket `timestamp` falls in.
pub fn truncate(timestamp: DateTime<Utc>, unit: BucketUnit) -> Result<DateTime<Utc>> {
    let (month, day, hour) = match unit {
        BucketUnit::Hour => (timestamp.month(), timestamp.day(), timestamp.hour()),
        BucketUnit::Day => (timestamp.month(), timestamp.day(), 0),
        BucketUnit::Month => (timestamp.month(), 1, 0),
        BucketUnit::Year => (1, 1, 0),
    };

    Utc.with_ymd_and_hms(timestamp.year(), month, day, hour, 0, 0)
        .single()
        .ok_or_else(|| {
            MetricsError::Internal(format!("cannot truncate {} to {}", timestamp, unit.as_str()))
        })
}

/// Running sums for the mean of each field; missing values are skipped.
#[derive(Debug, Default)]
struct Accumulator {
    cpu_load_sum: f64,
    cpu_load_count: u64,
    concurrency_sum: f64,
    concurrency_count: u64,
}

impl Accumulator {
    fn add(&mut self, sample: &Metric) {
        if let Some(cpu_load) = sample.cpu_load {
            self.cpu_load_sum += cpu_load;
            self.cpu_load_count += 1;
        }
        if let Some(concurrency) = sample.concurrency {
            self.concurrency_sum += concurrency as f64;
            self.concurrency_count += 1;
        }
    }

    fn means(&self, metric_type: MetricType) -> (Option<f64>, Option<f64>) {
        let cpu_load = (metric_type.includes_cpu_load() && self.cpu_load_count > 0)
            .then(|| self.cpu_load_sum / self.cpu_load_count as f64);
        let concurrency = (metric_type.includes_concurrency() && self.concurrency_count > 0)
            .then(|| self.concurrency_sum / self.concurrency_count as f64);
        (cpu_load, concurrency)
    }
}
