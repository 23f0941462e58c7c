// ABOUTME: `sync` subcommand - builds a JobOptions from CLI flags plus any persisted checkpoint
// ABOUTME: and runs one SyncExecutor job, updating the on-disk job state on exit

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::EngineConfig;
use crate::executor::{ConflictStrategy, JobOptions, SyncDirection, SyncExecutor, SyncResult, TableConfig};
use crate::idempotency::{IdempotencyTracker, InMemoryEphemeralStore};
use crate::progress::TracingLogSink;
use crate::state::{self, SyncState};

pub struct SyncArgs {
    pub job_id: String,
    pub source_url: String,
    pub target_url: String,
    pub tables: Vec<String>,
    pub direction: SyncDirection,
    pub conflict_strategy: ConflictStrategy,
    pub schema: Option<String>,
    pub config: EngineConfig,
    pub resume: bool,
    pub insecure_tls: bool,
}

/// Runs one resumable sync job. Looks up any checkpoint
/// persisted under `args.job_id` when `--resume` is set, runs the job to
/// completion or to its first fatal error, then persists or clears the
/// on-disk state depending on the outcome.
pub async fn run_sync(args: SyncArgs) -> Result<SyncResult> {
    let checkpoint = if args.resume {
        state::load(&args.job_id)
            .context("failed to load prior job state")?
            .and_then(|s| s.checkpoint)
    } else {
        None
    };

    if args.resume && checkpoint.is_some() {
        println!("resuming job {} from prior checkpoint", args.job_id);
    }

    let tables: Vec<TableConfig> = args
        .tables
        .iter()
        .map(|name| TableConfig {
            table_name: name.clone(),
            enabled: true,
            conflict_strategy: Some(args.conflict_strategy),
        })
        .collect();

    let opts = JobOptions {
        job_id: args.job_id.clone(),
        source_url: args.source_url.clone(),
        target_url: args.target_url.clone(),
        tables,
        direction: args.direction,
        checkpoint,
        batch_size: Some(args.config.batch_size),
        schema: args.schema.clone(),
    };

    let idempotency = Arc::new(IdempotencyTracker::new(
        Some(Arc::new(InMemoryEphemeralStore::new())),
        None,
    ));

    let executor = SyncExecutor::new(args.config.clone())
        .with_idempotency(idempotency)
        .with_log_sink(Arc::new(TracingLogSink))
        .with_insecure_tls(args.insecure_tls);

    let result = executor.execute(opts).await;

    match &result {
        Ok(sync_result) if sync_result.success => {
            state::clear(&args.job_id).context("failed to clear job state after success")?;
        }
        Ok(sync_result) => {
            let saved = SyncState::new(args.job_id.as_str(), &args.source_url, &args.target_url, args.direction)?
                .with_checkpoint(sync_result.checkpoint.clone());
            state::save(&saved).context("failed to persist job state after partial run")?;
        }
        Err(_) => {
            // The executor already persists its own checkpoint via the log
            // sink's progress callback before a fatal error propagates; all
            // we do here is leave any prior state file untouched so a
            // `--resume` re-run picks it back up.
        }
    }

    result
}
