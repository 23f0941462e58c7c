// ABOUTME: Value types for the sync executor's public contract - job options, per-table
// ABOUTME: results, and the conflicts produced by manual-strategy two-way resolution

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::JobMetricsRecord;
use crate::progress::SyncCheckpoint;

/// Sync direction for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    OneWay,
    TwoWay,
}

/// Per-row conflict policy, only consulted in two-way mode when the
/// target row is newer than the source row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    LastWriteWins,
    SourceWins,
    TargetWins,
    Manual,
}

impl Default for ConflictStrategy {
    fn default() -> Self {
        ConflictStrategy::LastWriteWins
    }
}

/// One table's participation in a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    pub table_name: String,
    pub enabled: bool,
    #[serde(default)]
    pub conflict_strategy: Option<ConflictStrategy>,
}

impl TableConfig {
    pub fn new(table_name: impl Into<String>) -> Self {
        TableConfig {
            table_name: table_name.into(),
            enabled: true,
            conflict_strategy: None,
        }
    }

    pub fn strategy(&self) -> ConflictStrategy {
        self.conflict_strategy.unwrap_or_default()
    }
}

/// Input to [`crate::executor::SyncExecutor::execute`].
#[derive(Debug, Clone)]
pub struct JobOptions {
    pub job_id: String,
    pub source_url: String,
    pub target_url: String,
    pub tables: Vec<TableConfig>,
    pub direction: SyncDirection,
    pub checkpoint: Option<SyncCheckpoint>,
    pub batch_size: Option<u32>,
    /// Postgres schema to operate in on both sides; defaults to `public`.
    pub schema: Option<String>,
}

impl JobOptions {
    pub fn schema_name(&self) -> &str {
        self.schema.as_deref().unwrap_or("public")
    }
}

/// A conflict recorded when `ConflictStrategy::Manual` sees a target row
/// newer than the source row in two-way mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub id: String,
    pub table_name: String,
    pub row_id: String,
    pub source_data: serde_json::Value,
    pub target_data: serde_json::Value,
    pub source_updated_at: DateTime<Utc>,
    pub target_updated_at: DateTime<Utc>,
}

/// Counts of rows skipped for each reason, broken out so the caller can
/// tell "nothing to do" apart from "conflicts need attention" apart from
/// "rows are failing".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkippedReasons {
    pub already_synced: u64,
    pub no_id: u64,
    pub conflict: u64,
    pub error: u64,
}

/// Per-table tally for one job. Caps error messages at 10 so a badly
/// behaved table can't flood the result with noise.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableSyncResult {
    pub inserted: u64,
    pub updated: u64,
    pub skipped: SkippedReasons,
    pub error_messages: Vec<String>,
}

impl TableSyncResult {
    pub fn record_error_message(&mut self, message: String) {
        if self.error_messages.len() < 10 {
            self.error_messages.push(message);
        }
    }

    pub fn total_skipped(&self) -> u64 {
        self.skipped.already_synced + self.skipped.no_id + self.skipped.conflict + self.skipped.error
    }
}

/// The outcome of one `Execute` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResult {
    pub job_id: String,
    pub success: bool,
    pub checkpoint: Option<SyncCheckpoint>,
    pub tables: HashMap<String, TableSyncResult>,
    pub conflicts: Vec<Conflict>,
    pub metrics: JobMetricsRecord,
}
