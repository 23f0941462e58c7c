// ABOUTME: `daemon` subcommand - backgrounds the process and re-runs `sync` on an interval
// ABOUTME: Optionally runs the reconciler between sync passes to catch source-side deletions

use std::time::Duration;

use anyhow::{Context, Result};

use crate::commands::sync::{run_sync, SyncArgs};
use crate::config::EngineConfig;
use crate::daemon;
use crate::executor::{ConflictStrategy, SyncDirection};
use crate::postgres;
use crate::reconcile::Reconciler;

#[derive(Clone, Copy)]
pub enum DaemonAction {
    Start,
    Stop,
    Status,
}

pub struct DaemonArgs {
    pub action: DaemonAction,
    pub job_id: String,
    pub source_url: String,
    pub target_url: String,
    pub tables: Vec<String>,
    pub direction: SyncDirection,
    pub conflict_strategy: ConflictStrategy,
    pub schema: Option<String>,
    pub config: EngineConfig,
    pub insecure_tls: bool,
    pub sync_interval: Duration,
    pub reconcile_interval: Option<Duration>,
}

/// Dispatches `daemon --start|--stop|--status`. `Start` backgrounds the
/// process (Unix fork via `daemonize`, Windows detached respawn) then
/// loops [`run_sync`] on `sync_interval`, running the reconciler every
/// `reconcile_interval` passes if one was configured.
pub async fn run_daemon(args: DaemonArgs) -> Result<()> {
    match args.action {
        DaemonAction::Status => return daemon::print_status(),
        DaemonAction::Stop => {
            let stopped = daemon::stop_daemon().context("failed to stop daemon")?;
            if stopped {
                println!("Daemon stopped.");
            } else {
                println!("No daemon was running.");
            }
            return Ok(());
        }
        DaemonAction::Start => {}
    }

    if !daemon::is_daemon_child() {
        #[cfg(unix)]
        daemon::daemonize()?;
        #[cfg(windows)]
        {
            daemon::daemonize()?;
            return Ok(());
        }
    } else {
        daemon::init_daemon_child()?;
    }

    run_daemon_loop(&args).await
}

async fn run_daemon_loop(args: &DaemonArgs) -> Result<()> {
    let mut passes_since_reconcile: u32 = 0;
    let reconcile_every_n_passes = 1u32;

    loop {
        let sync_args = SyncArgs {
            job_id: args.job_id.clone(),
            source_url: args.source_url.clone(),
            target_url: args.target_url.clone(),
            tables: args.tables.clone(),
            direction: args.direction,
            conflict_strategy: args.conflict_strategy,
            schema: args.schema.clone(),
            config: args.config.clone(),
            resume: true,
            insecure_tls: args.insecure_tls,
        };

        match run_sync(sync_args).await {
            Ok(result) => {
                tracing::info!(job_id = %result.job_id, success = result.success, "daemon sync pass complete");
            }
            Err(err) => {
                tracing::error!(error = %err, "daemon sync pass failed");
            }
        }

        if let Some(reconcile_interval) = args.reconcile_interval {
            passes_since_reconcile += 1;
            if passes_since_reconcile >= reconcile_every_n_passes {
                passes_since_reconcile = 0;
                if let Err(err) = run_reconcile_pass(args).await {
                    tracing::error!(error = %err, "daemon reconcile pass failed");
                }
                tokio::time::sleep(reconcile_interval).await;
                continue;
            }
        }

        tokio::time::sleep(args.sync_interval).await;
    }
}

async fn run_reconcile_pass(args: &DaemonArgs) -> Result<()> {
    let source_client = postgres::connect_with_retry(&args.source_url).await?;
    let target_client = postgres::connect_with_retry(&args.target_url).await?;
    let reconciler = Reconciler::new(&source_client, &target_client);
    let schema = args.schema.as_deref().unwrap_or("public");

    for table_name in &args.tables {
        let table = table_name.as_str();
        let pk_columns = vec!["id".to_string()];
        match reconciler.reconcile_table(schema, table, &pk_columns).await {
            Ok(deleted) if deleted > 0 => {
                tracing::info!(table, deleted, "reconciler removed orphaned target rows");
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(table, error = %err, "reconciler failed for table");
            }
        }
    }

    Ok(())
}
