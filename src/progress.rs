// ABOUTME: Progress snapshots, checkpoints, and the push-only log sink
// ABOUTME: Re-architects the callback quartet (progress/log/checkpoint/completion) as narrow traits

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A resumable position in a sync job. Resuming from a checkpoint must
/// produce a final target state identical to an uninterrupted run,
/// assuming the source has not changed since.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncCheckpoint {
    pub last_table: String,
    pub last_row_id: Option<String>,
    pub last_updated_at: Option<String>,
    pub processed_tables: Vec<String>,
}

impl SyncCheckpoint {
    pub fn new(last_table: impl Into<String>) -> Self {
        SyncCheckpoint {
            last_table: last_table.into(),
            last_row_id: None,
            last_updated_at: None,
            processed_tables: Vec::new(),
        }
    }
}

/// A progress snapshot pushed to the caller at least once per batch and
/// once per table transition. Invariant: counters are monotonic across
/// two consecutive snapshots within the same job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncProgress {
    pub total_tables: usize,
    pub completed_tables: usize,
    pub current_table: Option<String>,
    pub total_rows: u64,
    pub processed_rows: u64,
    pub inserted_rows: u64,
    pub updated_rows: u64,
    pub skipped_rows: u64,
    pub errors: u64,
}

impl SyncProgress {
    /// True if every counter in `self` is >= the matching counter in
    /// `prior` — the monotonicity property callers may assert across
    /// successive snapshots.
    pub fn is_monotonic_advance_from(&self, prior: &SyncProgress) -> bool {
        self.completed_tables >= prior.completed_tables
            && self.total_rows >= prior.total_rows
            && self.processed_rows >= prior.processed_rows
            && self.inserted_rows >= prior.inserted_rows
            && self.updated_rows >= prior.updated_rows
            && self.skipped_rows >= prior.skipped_rows
            && self.errors >= prior.errors
    }
}

/// Log severity levels accepted by a [`LogSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// A push-only log/progress/checkpoint/completion destination. The
/// executor never awaits a sink beyond local acknowledgement — a slow or
/// failing sink must not stall the sync, so implementations that need to
/// do real I/O (write to disk, call a webhook) should buffer or drop
/// rather than block here.
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, message: &str, metadata: Option<HashMap<String, String>>);

    fn progress(&self, snapshot: &SyncProgress) {
        let _ = snapshot;
    }

    fn checkpoint(&self, checkpoint: &SyncCheckpoint) {
        let _ = checkpoint;
    }

    fn complete(&self, success: bool, checkpoint: Option<&SyncCheckpoint>) {
        let _ = (success, checkpoint);
    }
}

/// Forwards every sink call to `tracing`, the engine's CLI-facing adapter.
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn log(&self, level: LogLevel, message: &str, metadata: Option<HashMap<String, String>>) {
        match level {
            LogLevel::Info => tracing::info!(?metadata, "{}", message),
            LogLevel::Warn => tracing::warn!(?metadata, "{}", message),
            LogLevel::Error => tracing::error!(?metadata, "{}", message),
        }
    }

    fn progress(&self, snapshot: &SyncProgress) {
        tracing::debug!(
            table = ?snapshot.current_table,
            processed = snapshot.processed_rows,
            inserted = snapshot.inserted_rows,
            updated = snapshot.updated_rows,
            skipped = snapshot.skipped_rows,
            errors = snapshot.errors,
            "sync progress"
        );
    }

    fn checkpoint(&self, checkpoint: &SyncCheckpoint) {
        tracing::debug!(table = %checkpoint.last_table, row_id = ?checkpoint.last_row_id, "checkpoint written");
    }

    fn complete(&self, success: bool, checkpoint: Option<&SyncCheckpoint>) {
        tracing::info!(success, resumable = checkpoint.is_some(), "sync job complete");
    }
}

/// A single record enqueued onto a [`ChannelLogSink`].
#[derive(Debug, Clone)]
pub enum SinkEvent {
    Log {
        level: LogLevel,
        message: String,
        metadata: Option<HashMap<String, String>>,
    },
    Progress(SyncProgress),
    Checkpoint(SyncCheckpoint),
    Complete {
        success: bool,
        checkpoint: Option<SyncCheckpoint>,
    },
}

/// Forwards every sink call onto an unbounded `mpsc` channel, for embedders
/// that want to drive their own UI off the event stream without the
/// executor ever blocking on consumption.
pub struct ChannelLogSink {
    tx: tokio::sync::mpsc::UnboundedSender<SinkEvent>,
}

impl ChannelLogSink {
    pub fn new() -> (Self, tokio::sync::mpsc::UnboundedReceiver<SinkEvent>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (ChannelLogSink { tx }, rx)
    }
}

impl LogSink for ChannelLogSink {
    fn log(&self, level: LogLevel, message: &str, metadata: Option<HashMap<String, String>>) {
        let _ = self.tx.send(SinkEvent::Log {
            level,
            message: message.to_string(),
            metadata,
        });
    }

    fn progress(&self, snapshot: &SyncProgress) {
        let _ = self.tx.send(SinkEvent::Progress(snapshot.clone()));
    }

    fn checkpoint(&self, checkpoint: &SyncCheckpoint) {
        let _ = self.tx.send(SinkEvent::Checkpoint(checkpoint.clone()));
    }

    fn complete(&self, success: bool, checkpoint: Option<&SyncCheckpoint>) {
        let _ = self.tx.send(SinkEvent::Complete {
            success,
            checkpoint: checkpoint.cloned(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_monotonic_check_passes_for_non_decreasing_counters() {
        let prior = SyncProgress {
            processed_rows: 10,
            inserted_rows: 5,
            ..Default::default()
        };
        let next = SyncProgress {
            processed_rows: 20,
            inserted_rows: 5,
            ..Default::default()
        };
        assert!(next.is_monotonic_advance_from(&prior));
    }

    #[test]
    fn progress_monotonic_check_fails_for_decreasing_counter() {
        let prior = SyncProgress {
            processed_rows: 20,
            ..Default::default()
        };
        let next = SyncProgress {
            processed_rows: 10,
            ..Default::default()
        };
        assert!(!next.is_monotonic_advance_from(&prior));
    }

    #[test]
    fn checkpoint_new_starts_with_empty_processed_tables() {
        let cp = SyncCheckpoint::new("users");
        assert_eq!(cp.last_table, "users");
        assert!(cp.processed_tables.is_empty());
        assert!(cp.last_row_id.is_none());
    }

    #[tokio::test]
    async fn channel_log_sink_forwards_events() {
        let (sink, mut rx) = ChannelLogSink::new();
        sink.log(LogLevel::Info, "hello", None);
        match rx.recv().await.unwrap() {
            SinkEvent::Log { message, .. } => assert_eq!(message, "hello"),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
