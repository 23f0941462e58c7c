// ABOUTME: Value types accumulated by the metrics collector for one job

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMetrics {
    pub table_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub rows_processed: u64,
    pub rows_inserted: u64,
    pub rows_updated: u64,
    pub rows_skipped: u64,
    pub errors: u64,
    pub duration_ms: Option<u64>,
}

impl TableMetrics {
    pub fn new(table_name: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        TableMetrics {
            table_name: table_name.into(),
            started_at,
            completed_at: None,
            rows_processed: 0,
            rows_inserted: 0,
            rows_updated: 0,
            rows_skipped: 0,
            errors: 0,
            duration_ms: None,
        }
    }

    /// Rows per second over the table's elapsed duration so far; `0.0`
    /// before any rows are processed or before the clock has advanced.
    pub fn rows_per_sec(&self) -> f64 {
        let elapsed_ms = self
            .duration_ms
            .unwrap_or_else(|| (Utc::now() - self.started_at).num_milliseconds().max(0) as u64);
        if elapsed_ms == 0 {
            0.0
        } else {
            self.rows_processed as f64 / (elapsed_ms as f64 / 1000.0)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub at: DateTime<Utc>,
    pub rows_processed: u64,
    pub current_table: Option<String>,
    pub average_batch_ms: f64,
}

/// Full metrics record persisted to the durable store on job completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMetricsRecord {
    pub job_id: String,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub rows_processed: u64,
    pub rows_inserted: u64,
    pub rows_updated: u64,
    pub rows_skipped: u64,
    pub errors: u64,
    pub retries: u64,
    pub throttling_ms: u64,
    pub tables: HashMap<String, TableMetrics>,
    pub snapshots: Vec<MetricsSnapshot>,
}
