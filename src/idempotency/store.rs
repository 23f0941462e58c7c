// ABOUTME: Two-tier idempotency store composition - fast ephemeral TTL store plus a
// ABOUTME: pluggable durable backend; absence of either degrades to no-op, never a special case

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::types::{ProcessedRow, RowKey};

/// Default batch size for bulk mark/query variants.
pub const DEFAULT_BULK_BATCH_SIZE: usize = 100;

/// Default ephemeral-store TTL.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[async_trait]
pub trait EphemeralStore: Send + Sync {
    async fn mark(&self, row: &ProcessedRow, ttl: Duration) -> Result<()>;
    async fn is_processed(&self, key: &RowKey) -> Result<bool>;
}

#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn mark(&self, row: &ProcessedRow) -> Result<()>;
    async fn mark_bulk(&self, rows: &[ProcessedRow]) -> Result<()>;
    async fn is_processed(&self, key: &RowKey) -> Result<bool>;
    async fn get_processed_ids(
        &self,
        sync_job_id: &str,
        table_name: &str,
        row_ids: &[String],
    ) -> Result<HashSet<String>>;
    async fn cleanup_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

struct EphemeralEntry {
    expires_at: Instant,
}

/// Simple process-local ephemeral store. A production deployment would
/// more likely plug in Redis; this in-memory implementation satisfies the
/// same trait and is the default when no external cache is configured.
#[derive(Default)]
pub struct InMemoryEphemeralStore {
    entries: Mutex<HashMap<RowKey, EphemeralEntry>>,
}

impl InMemoryEphemeralStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EphemeralStore for InMemoryEphemeralStore {
    async fn mark(&self, row: &ProcessedRow, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            row.key(),
            EphemeralEntry {
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn is_processed(&self, key: &RowKey) -> Result<bool> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(true),
            Some(_) => {
                entries.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }
}

/// Composes an optional ephemeral and optional durable store behind a
/// single interface: reads consult ephemeral first, then durable; writes
/// go to both. Neither backend configured means every row reads back as
/// unprocessed (the executor must then treat every row as new work).
pub struct IdempotencyTracker {
    ephemeral: Option<Arc<dyn EphemeralStore>>,
    durable: Option<Arc<dyn DurableStore>>,
    ttl: Duration,
}

impl IdempotencyTracker {
    pub fn new(ephemeral: Option<Arc<dyn EphemeralStore>>, durable: Option<Arc<dyn DurableStore>>) -> Self {
        IdempotencyTracker {
            ephemeral,
            durable,
            ttl: DEFAULT_TTL,
        }
    }

    pub fn no_op() -> Self {
        IdempotencyTracker::new(None, None)
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub async fn mark_row_processed(&self, row: ProcessedRow) -> Result<()> {
        if let Some(ephemeral) = &self.ephemeral {
            ephemeral.mark(&row, self.ttl).await?;
        }
        if let Some(durable) = &self.durable {
            durable.mark(&row).await?;
        }
        Ok(())
    }

    pub async fn is_row_processed(&self, sync_job_id: &str, table_name: &str, row_id: &str) -> Result<bool> {
        let key = RowKey::new(sync_job_id, table_name, row_id);
        if let Some(ephemeral) = &self.ephemeral {
            if ephemeral.is_processed(&key).await? {
                return Ok(true);
            }
        }
        if let Some(durable) = &self.durable {
            return durable.is_processed(&key).await;
        }
        Ok(false)
    }

    pub async fn mark_rows_processed(&self, rows: &[ProcessedRow]) -> Result<()> {
        for chunk in rows.chunks(DEFAULT_BULK_BATCH_SIZE) {
            if let Some(ephemeral) = &self.ephemeral {
                for row in chunk {
                    ephemeral.mark(row, self.ttl).await?;
                }
            }
            if let Some(durable) = &self.durable {
                durable.mark_bulk(chunk).await?;
            }
        }
        Ok(())
    }

    pub async fn get_processed_row_ids(
        &self,
        sync_job_id: &str,
        table_name: &str,
        row_ids: &[String],
    ) -> Result<HashSet<String>> {
        let Some(durable) = &self.durable else {
            return Ok(HashSet::new());
        };
        let mut processed = HashSet::new();
        for chunk in row_ids.chunks(DEFAULT_BULK_BATCH_SIZE) {
            let found = durable.get_processed_ids(sync_job_id, table_name, chunk).await?;
            processed.extend(found);
        }
        Ok(processed)
    }

    pub async fn cleanup_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        match &self.durable {
            Some(durable) => durable.cleanup_before(cutoff).await,
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idempotency::types::Operation;

    fn row(id: &str) -> ProcessedRow {
        ProcessedRow {
            sync_job_id: "job-1".to_string(),
            table_name: "users".to_string(),
            row_id: id.to_string(),
            operation: Operation::Insert,
            batch_id: None,
            processed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn no_op_tracker_treats_every_row_as_unprocessed() {
        let tracker = IdempotencyTracker::no_op();
        tracker.mark_row_processed(row("1")).await.unwrap();
        assert!(!tracker.is_row_processed("job-1", "users", "1").await.unwrap());
    }

    #[tokio::test]
    async fn ephemeral_only_tracks_marked_rows() {
        let ephemeral = Arc::new(InMemoryEphemeralStore::new());
        let tracker = IdempotencyTracker::new(Some(ephemeral), None);
        tracker.mark_row_processed(row("1")).await.unwrap();
        assert!(tracker.is_row_processed("job-1", "users", "1").await.unwrap());
        assert!(!tracker.is_row_processed("job-1", "users", "2").await.unwrap());
    }

    #[tokio::test]
    async fn expired_ephemeral_entry_reads_back_unprocessed() {
        let ephemeral = Arc::new(InMemoryEphemeralStore::new());
        let tracker = IdempotencyTracker::new(Some(ephemeral), None).with_ttl(Duration::from_millis(1));
        tracker.mark_row_processed(row("1")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!tracker.is_row_processed("job-1", "users", "1").await.unwrap());
    }
}
