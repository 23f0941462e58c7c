// ABOUTME: Metrics Collector (C7) - accumulates timings, throughput, retries, throttle stats
// ABOUTME: exclusively owned by the executor for the lifetime of one job

use std::collections::{HashMap, VecDeque};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::types::{JobMetricsRecord, JobStatus, MetricsSnapshot, TableMetrics};

/// Rolling window size for the batch-timing moving average.
const BATCH_TIMING_WINDOW: usize = 20;
/// Cap on retained periodic snapshots; oldest is evicted past this.
const MAX_SNAPSHOTS: usize = 100;

#[async_trait]
pub trait MetricsStore: Send + Sync {
    async fn persist(&self, record: &JobMetricsRecord) -> Result<()>;
}

pub struct MetricsCollector {
    job_id: String,
    started_at: DateTime<Utc>,
    current_table: Option<String>,
    tables: HashMap<String, TableMetrics>,
    rows_processed: u64,
    rows_inserted: u64,
    rows_updated: u64,
    rows_skipped: u64,
    errors: u64,
    retries: u64,
    throttling_ms: u64,
    batch_timings: VecDeque<u64>,
    snapshots: Vec<MetricsSnapshot>,
}

impl MetricsCollector {
    pub fn new(job_id: impl Into<String>) -> Self {
        MetricsCollector {
            job_id: job_id.into(),
            started_at: Utc::now(),
            current_table: None,
            tables: HashMap::new(),
            rows_processed: 0,
            rows_inserted: 0,
            rows_updated: 0,
            rows_skipped: 0,
            errors: 0,
            retries: 0,
            throttling_ms: 0,
            batch_timings: VecDeque::with_capacity(BATCH_TIMING_WINDOW),
            snapshots: Vec::new(),
        }
    }

    pub fn start_table(&mut self, table_name: &str) {
        self.current_table = Some(table_name.to_string());
        self.tables
            .entry(table_name.to_string())
            .or_insert_with(|| TableMetrics::new(table_name, Utc::now()));
    }

    pub fn complete_table(&mut self, table_name: &str) {
        if let Some(table) = self.tables.get_mut(table_name) {
            let now = Utc::now();
            table.completed_at = Some(now);
            table.duration_ms = Some((now - table.started_at).num_milliseconds().max(0) as u64);
        }
        if self.current_table.as_deref() == Some(table_name) {
            self.current_table = None;
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn record_batch(
        &mut self,
        table_name: &str,
        row_count: u64,
        duration_ms: u64,
        inserted: u64,
        updated: u64,
        skipped: u64,
        errors: u64,
        _bytes: u64,
    ) {
        self.rows_processed += row_count;
        self.rows_inserted += inserted;
        self.rows_updated += updated;
        self.rows_skipped += skipped;
        self.errors += errors;

        if let Some(table) = self.tables.get_mut(table_name) {
            table.rows_processed += row_count;
            table.rows_inserted += inserted;
            table.rows_updated += updated;
            table.rows_skipped += skipped;
            table.errors += errors;
        }

        if self.batch_timings.len() == BATCH_TIMING_WINDOW {
            self.batch_timings.pop_front();
        }
        self.batch_timings.push_back(duration_ms);

        self.push_snapshot(table_name.to_string());
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    pub fn record_retry(&mut self) {
        self.retries += 1;
    }

    pub fn record_throttling(&mut self, duration_ms: u64) {
        self.throttling_ms += duration_ms;
    }

    /// Moving average over the last [`BATCH_TIMING_WINDOW`] batches.
    pub fn average_batch_ms(&self) -> f64 {
        if self.batch_timings.is_empty() {
            0.0
        } else {
            self.batch_timings.iter().sum::<u64>() as f64 / self.batch_timings.len() as f64
        }
    }

    fn push_snapshot(&mut self, current_table: String) {
        if self.snapshots.len() >= MAX_SNAPSHOTS {
            self.snapshots.remove(0);
        }
        self.snapshots.push(MetricsSnapshot {
            at: Utc::now(),
            rows_processed: self.rows_processed,
            current_table: Some(current_table),
            average_batch_ms: self.average_batch_ms(),
        });
    }

    pub fn snapshots(&self) -> &[MetricsSnapshot] {
        &self.snapshots
    }

    pub fn rows_processed(&self) -> u64 {
        self.rows_processed
    }

    pub fn rows_inserted(&self) -> u64 {
        self.rows_inserted
    }

    pub fn rows_updated(&self) -> u64 {
        self.rows_updated
    }

    pub fn rows_skipped(&self) -> u64 {
        self.rows_skipped
    }

    pub fn errors(&self) -> u64 {
        self.errors
    }

    fn to_record(&self, status: JobStatus) -> JobMetricsRecord {
        let completed_at = Utc::now();
        JobMetricsRecord {
            job_id: self.job_id.clone(),
            status,
            started_at: self.started_at,
            completed_at,
            duration_ms: (completed_at - self.started_at).num_milliseconds().max(0) as u64,
            rows_processed: self.rows_processed,
            rows_inserted: self.rows_inserted,
            rows_updated: self.rows_updated,
            rows_skipped: self.rows_skipped,
            errors: self.errors,
            retries: self.retries,
            throttling_ms: self.throttling_ms,
            tables: self.tables.clone(),
            snapshots: self.snapshots.clone(),
        }
    }

    /// Finalize the job: builds the full record and, if a durable store is
    /// configured, persists it. Returns the record either way so callers
    /// without a store can still inspect the final tally.
    pub async fn complete(
        &self,
        status: JobStatus,
        store: Option<&dyn MetricsStore>,
    ) -> Result<JobMetricsRecord> {
        let record = self.to_record(status);
        if let Some(store) = store {
            store.persist(&record).await?;
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_and_complete_table_tracks_duration() {
        let mut collector = MetricsCollector::new("job-1");
        collector.start_table("users");
        collector.record_batch("users", 10, 50, 8, 2, 0, 0, 1024);
        collector.complete_table("users");
        let table = &collector.tables["users"];
        assert_eq!(table.rows_processed, 10);
        assert!(table.completed_at.is_some());
        assert!(table.duration_ms.is_some());
    }

    #[test]
    fn average_batch_ms_uses_rolling_window() {
        let mut collector = MetricsCollector::new("job-1");
        collector.start_table("users");
        for _ in 0..25 {
            collector.record_batch("users", 1, 100, 1, 0, 0, 0, 0);
        }
        assert_eq!(collector.average_batch_ms(), 100.0);
    }

    #[test]
    fn snapshots_are_capped_at_max() {
        let mut collector = MetricsCollector::new("job-1");
        collector.start_table("users");
        for _ in 0..150 {
            collector.record_batch("users", 1, 10, 1, 0, 0, 0, 0);
        }
        assert_eq!(collector.snapshots().len(), MAX_SNAPSHOTS);
    }

    #[tokio::test]
    async fn complete_without_store_returns_record() {
        let mut collector = MetricsCollector::new("job-1");
        collector.start_table("users");
        collector.record_batch("users", 5, 10, 5, 0, 0, 0, 0);
        let record = collector.complete(JobStatus::Completed, None).await.unwrap();
        assert_eq!(record.rows_processed, 5);
        assert_eq!(record.status, JobStatus::Completed);
    }
}
