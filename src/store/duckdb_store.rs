use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use duckdb::{params, Connection};
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{sql, MetricBackend, TimeRange};
use crate::models::{BucketUnit, Metric, MetricAverage, MetricType};
use crate::telemetry;
use crate::{MetricsError, Result};

/// Database path that selects a private in-process database.
pub const IN_MEMORY: &str = ":memory:";

/// Statements allowed to run on the blocking pool at once.
pub const DEFAULT_MAX_CONCURRENT_QUERIES: usize = 8;

/// DuckDB-backed sample store.
///
/// The root connection is shared; every operation runs on its own clone of it
/// on the blocking pool. A statement keeps its slot until DuckDB returns, even
/// when the caller gave up waiting, so abandoned queries still count against
/// the limit.
#[derive(Clone)]
pub struct DuckDbStore {
    conn: Arc<Mutex<Connection>>,
    table: Arc<str>,
    slots: Arc<Semaphore>,
}

impl DuckDbStore {
    pub fn open(path: &str, table: &str) -> Result<Self> {
        sql::validate_identifier(table)?;

        let conn = if path == IN_MEMORY {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        info!("Opened DuckDB database {} (table {})", path, table);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            table: Arc::from(table),
            slots: Arc::new(Semaphore::new(DEFAULT_MAX_CONCURRENT_QUERIES)),
        })
    }

    /// Caps how many statements may run at once. Zero is treated as one.
    pub fn with_max_concurrent_queries(mut self, limit: usize) -> Self {
        self.slots = Arc::new(Semaphore::new(limit.max(1)));
        self
    }

    /// Slots not held by a running statement.
    pub fn idle_query_slots(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn open_in_memory(table: &str) -> Result<Self> {
        Self::open(IN_MEMORY, table)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Loads samples into the table. Used for fixtures and local seeding;
    /// the service itself never writes.
    pub async fn insert_metrics(&self, samples: Vec<Metric>) -> Result<usize> {
        self.with_connection(move |conn, table| {
            let mut stmt = conn.prepare(&sql::insert_sample(table))?;
            for sample in &samples {
                stmt.execute(params![
                    millis(sample.timestamp),
                    sample.cpu_load,
                    sample.concurrency
                ])?;
            }
            telemetry::record_storage_operation();
            Ok(samples.len())
        })
        .await
    }

    /// Deletes samples strictly older than `cutoff`.
    pub async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.with_connection(move |conn, table| {
            let deleted = conn.execute(&sql::delete_before(table), params![millis(cutoff)])?;
            if deleted > 0 {
                info!("Purged {} samples older than {} from {}", deleted, cutoff, table);
            }
            telemetry::record_storage_operation();
            Ok(deleted)
        })
        .await
    }

    /// Purges samples older than `retention` right away and then once per
    /// `every`, until the returned handle is aborted.
    pub fn spawn_retention_sweep(
        &self,
        retention: chrono::Duration,
        every: Duration,
    ) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                if let Err(e) = store.purge_before(Utc::now() - retention).await {
                    warn!("Retention sweep failed: {}", e);
                }
            }
        })
    }

    async fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection, &str) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|e| MetricsError::Internal(format!("query slots closed: {}", e)))?;
        let conn = self.conn.lock().try_clone()?;
        let table = Arc::clone(&self.table);
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            f(&conn, &table)
        })
        .await?
    }
}

#[async_trait]
impl MetricBackend for DuckDbStore {
    async fn ensure_schema_ready(&self) -> Result<()> {
        self.with_connection(|conn, table| {
            conn.execute_batch(&sql::create_table(table))?;
            info!("Table {} is ready", table);
            Ok(())
        })
        .await
    }

    async fn range_query(&self, range: TimeRange, metric_type: MetricType) -> Result<Vec<Metric>> {
        self.with_connection(move |conn, table| {
            let mut stmt = conn.prepare(&sql::range_scan(table, metric_type))?;
            let rows = stmt.query_map(params![millis(range.start), millis(range.end)], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<f64>>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                ))
            })?;

            let mut metrics = Vec::new();
            for row in rows {
                let (ts, cpu_load, concurrency) = row?;
                metrics.push(Metric {
                    timestamp: from_millis(ts)?,
                    cpu_load,
                    concurrency,
                });
            }
            debug!("Range scan on {} returned {} rows", table, metrics.len());
            telemetry::record_storage_operation();
            Ok(metrics)
        })
        .await
    }

    async fn bucketed_aggregate(
        &self,
        range: TimeRange,
        unit: BucketUnit,
        metric_type: MetricType,
    ) -> Result<Vec<Metric>> {
        self.with_connection(move |conn, table| {
            let mut stmt = conn.prepare(&sql::bucketed_average(table, unit, metric_type))?;
            let rows = stmt.query_map(params![millis(range.start), millis(range.end)], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<f64>>(1)?,
                    row.get::<_, Option<f64>>(2)?,
                ))
            })?;

            let mut metrics = Vec::new();
            for row in rows {
                let (bucket, cpu_load, concurrency) = row?;
                metrics.push(Metric {
                    timestamp: from_millis(bucket)?,
                    cpu_load,
                    concurrency: concurrency.map(|mean| mean.trunc() as i64),
                });
            }
            debug!(
                "Bucketed aggregate by {} on {} returned {} rows",
                unit.as_str(),
                table,
                metrics.len()
            );
            telemetry::record_storage_operation();
            Ok(metrics)
        })
        .await
    }

    async fn whole_range_aggregate(
        &self,
        range: TimeRange,
        metric_type: MetricType,
    ) -> Result<Vec<MetricAverage>> {
        self.with_connection(move |conn, table| {
            let mut stmt = conn.prepare(&sql::whole_range_average(table, metric_type))?;
            let rows = stmt.query_map(params![millis(range.start), millis(range.end)], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<i64>>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                    row.get::<_, Option<f64>>(3)?,
                    row.get::<_, Option<f64>>(4)?,
                ))
            })?;

            let mut averages = Vec::new();
            for row in rows {
                let (samples, first, last, cpu_load, concurrency) = row?;
                // An ungrouped aggregate yields a row even for an empty range.
                if samples == 0 {
                    continue;
                }
                averages.push(MetricAverage {
                    start_time: first.map(from_millis).transpose()?.unwrap_or(range.start),
                    end_time: last.map(from_millis).transpose()?.unwrap_or(range.end),
                    cpu_load,
                    concurrency,
                });
            }
            telemetry::record_storage_operation();
            Ok(averages)
        })
        .await
    }
}

fn millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| MetricsError::Store(format!("timestamp {}ms is out of range", ms)))
}
