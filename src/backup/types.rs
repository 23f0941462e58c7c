// ABOUTME: Value types for target backups taken before a first-run sync

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub id: Uuid,
    pub sync_job_id: String,
    pub target_connection_id: String,
    pub tables: Vec<String>,
    pub row_count: i64,
    pub size_bytes: u64,
    pub status: BackupStatus,
    pub created_at: DateTime<Utc>,
    /// Path to the `pg_dump --data-only` archive on disk; `None` until the
    /// dump subprocess completes.
    pub archive_path: Option<String>,
    /// SHA-256 of the archive file, recorded so a restore can detect a
    /// truncated or corrupted dump before handing it to `pg_restore`.
    pub checksum: Option<String>,
}

impl BackupMetadata {
    pub fn pending(sync_job_id: impl Into<String>, target_connection_id: impl Into<String>, tables: Vec<String>) -> Self {
        BackupMetadata {
            id: Uuid::new_v4(),
            sync_job_id: sync_job_id.into(),
            target_connection_id: target_connection_id.into(),
            tables,
            row_count: 0,
            size_bytes: 0,
            status: BackupStatus::Pending,
            created_at: Utc::now(),
            archive_path: None,
            checksum: None,
        }
    }
}
