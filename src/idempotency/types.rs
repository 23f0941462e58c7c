// ABOUTME: Value types for the idempotency tracker - processed-row records keyed by
// ABOUTME: (syncJobId, tableName, rowId), uniqueness enforced on the triple

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Insert,
    Update,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowKey {
    pub sync_job_id: String,
    pub table_name: String,
    pub row_id: String,
}

impl RowKey {
    pub fn new(sync_job_id: impl Into<String>, table_name: impl Into<String>, row_id: impl Into<String>) -> Self {
        RowKey {
            sync_job_id: sync_job_id.into(),
            table_name: table_name.into(),
            row_id: row_id.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedRow {
    pub sync_job_id: String,
    pub table_name: String,
    pub row_id: String,
    pub operation: Operation,
    pub batch_id: Option<String>,
    pub processed_at: DateTime<Utc>,
}

impl ProcessedRow {
    pub fn key(&self) -> RowKey {
        RowKey::new(&self.sync_job_id, &self.table_name, &self.row_id)
    }
}
