//! Backing stores for metric samples.
//!
//! The engine only talks to a store through [`MetricBackend`]. Query text and
//! connection handling stay inside the implementations.

pub mod duckdb_store;
pub mod memory_store;
pub mod sql;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{BucketUnit, Metric, MetricAverage, MetricType};
use crate::Result;

pub use duckdb_store::DuckDbStore;
pub use memory_store::MemoryStore;

/// Inclusive time range a store operation matches samples against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }
}

#[async_trait]
pub trait MetricBackend: Send + Sync {
    /// Makes sure the sample collection exists. Succeeds when it already does.
    async fn ensure_schema_ready(&self) -> Result<()>;

    /// Samples in `range`, oldest first, with fields outside `metric_type` left empty.
    async fn range_query(&self, range: TimeRange, metric_type: MetricType) -> Result<Vec<Metric>>;

    /// Per-bucket means of the fields selected by `metric_type`, ordered by
    /// bucket. Each row's timestamp is the bucket boundary.
    async fn bucketed_aggregate(
        &self,
        range: TimeRange,
        unit: BucketUnit,
        metric_type: MetricType,
    ) -> Result<Vec<Metric>>;

    /// Means over the whole range, one row per group the store produced.
    /// Zero rows when nothing matched. Row bounds are whatever the store
    /// reports and are not meaningful to callers.
    async fn whole_range_aggregate(
        &self,
        range: TimeRange,
        metric_type: MetricType,
    ) -> Result<Vec<MetricAverage>>;
}
