use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::models::{Metric, MetricAverage, Query};
use crate::store::{MetricBackend, TimeRange};
use crate::telemetry::{self, QueryTimer};
use crate::{MetricsError, Result};

/// Upper bound on a single aggregation round trip.
pub const DEFAULT_AGGREGATE_TIMEOUT: Duration = Duration::from_secs(2);

/// Executes [`Query`] values against a backend and normalizes what comes back.
///
/// The engine is cheap to clone and holds no per-request state; the backend is
/// shared by every clone.
#[derive(Clone)]
pub struct MetricQueryEngine {
    backend: Arc<dyn MetricBackend>,
    aggregate_timeout: Duration,
}

impl MetricQueryEngine {
    pub fn new(backend: Arc<dyn MetricBackend>) -> Self {
        Self {
            backend,
            aggregate_timeout: DEFAULT_AGGREGATE_TIMEOUT,
        }
    }

    pub fn with_aggregate_timeout(mut self, timeout: Duration) -> Self {
        self.aggregate_timeout = timeout;
        self
    }

    pub fn aggregate_timeout(&self) -> Duration {
        self.aggregate_timeout
    }

    /// Samples in the query range, oldest first.
    ///
    /// Frequencies at or below the stored resolution read raw samples; coarser
    /// ones are averaged per bucket. An empty vector means no data matched.
    pub async fn get_series(&self, query: &Query) -> Result<Vec<Metric>> {
        let _timer = QueryTimer::new("series");
        let range = TimeRange::new(query.start_at, query.end_at);

        let series = match query.frequency.bucket_unit() {
            None => {
                debug!("Range scan for {}", query);
                telemetry::record_query("series", "range_scan");
                self.backend.range_query(range, query.metric_type).await?
            }
            Some(unit) => {
                debug!("Bucketed aggregate by {} for {}", unit.as_str(), query);
                telemetry::record_query("series", "bucketed");
                self.bounded(self.backend.bucketed_aggregate(range, unit, query.metric_type))
                    .await?
            }
        };

        if series.is_empty() {
            telemetry::record_empty_result("series");
        }
        Ok(series)
    }

    /// Mean of the selected fields over the whole query range, or `None` when
    /// nothing matched. The frequency of the query is not used.
    pub async fn get_average(&self, query: &Query) -> Result<Option<MetricAverage>> {
        let _timer = QueryTimer::new("average");
        let range = TimeRange::new(query.start_at, query.end_at);

        debug!("Whole-range aggregate for {}", query);
        telemetry::record_query("average", "whole_range");
        let mut rows = self
            .bounded(self.backend.whole_range_aggregate(range, query.metric_type))
            .await?;

        if rows.len() > 1 {
            return Err(MetricsError::InconsistentAggregate { rows: rows.len() });
        }

        match rows.pop() {
            Some(mut average) => {
                average.start_time = query.start_at;
                average.end_time = query.end_at;
                Ok(Some(average))
            }
            None => {
                telemetry::record_empty_result("average");
                Ok(None)
            }
        }
    }

    /// Gives up waiting after the aggregate timeout. The backend call is only
    /// dropped, so a statement already handed to the store runs to completion.
    async fn bounded<T, F>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.aggregate_timeout, operation).await {
            Ok(result) => result,
            Err(_) => {
                telemetry::record_timeout();
                Err(MetricsError::QueryTimeout(self.aggregate_timeout))
            }
        }
    }
}
