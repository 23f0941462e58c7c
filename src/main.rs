// ABOUTME: CLI entry point for pg-sync-engine
// ABOUTME: Parses subcommands and routes to the handlers in `commands`

use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

use pg_sync_engine::commands::{self, DaemonAction, DaemonArgs, DiffArgs, MigratePlanArgs, SyncArgs, ValidateArgs};
use pg_sync_engine::config::EngineConfig;
use pg_sync_engine::executor::{ConflictStrategy, SyncDirection};

#[derive(Parser)]
#[command(name = "pg-sync-engine")]
#[command(about = "PostgreSQL-to-PostgreSQL incremental sync engine", long_about = None)]
#[command(version)]
struct Cli {
    /// Allow self-signed TLS certificates (insecure - use only for testing)
    #[arg(long = "allow-self-signed-certs", global = true, default_value_t = false)]
    allow_self_signed_certs: bool,
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    /// Path to a replication-config.toml overriding built-in defaults
    #[arg(long = "config", global = true)]
    config_path: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run pre-flight privilege checks plus schema validation (C2/C3)
    Validate {
        #[arg(long)]
        source: String,
        #[arg(long)]
        target: String,
        /// Restrict to these tables (comma-separated); default is every syncable table
        #[arg(long, value_delimiter = ',')]
        tables: Vec<String>,
        /// Postgres schema to inspect on both sides
        #[arg(long, default_value = "public")]
        schema: String,
        /// Skip the connectivity/privilege pre-flight and go straight to schema validation
        #[arg(long)]
        skip_preflight: bool,
    },
    /// Print per-table insert/update counts between source and target (C5)
    Diff {
        #[arg(long)]
        source: String,
        #[arg(long)]
        target: String,
        #[arg(long, value_delimiter = ',')]
        tables: Vec<String>,
        #[arg(long, default_value = "public")]
        schema: String,
        /// Only diff rows updated at or after this RFC3339 timestamp
        #[arg(long)]
        since: Option<String>,
        /// Number of example row ids to print per table
        #[arg(long, default_value_t = 5)]
        sample_size: usize,
    },
    /// Print the idempotent DDL needed to align target to source (C4, advisory only)
    #[command(name = "migrate-plan")]
    MigratePlan {
        #[arg(long)]
        source: String,
        #[arg(long)]
        target: String,
        #[arg(long, value_delimiter = ',')]
        tables: Vec<String>,
        #[arg(long, default_value = "public")]
        schema: String,
    },
    /// Run one sync job to completion or to its first fatal error (C10)
    Sync {
        /// Stable job identifier; checkpoints are stored under this name
        #[arg(long)]
        job_id: String,
        #[arg(long)]
        source: String,
        #[arg(long)]
        target: String,
        #[arg(long, value_delimiter = ',')]
        tables: Vec<String>,
        #[arg(long, default_value = "public")]
        schema: String,
        /// Sync source -> target only, or keep both sides converging
        #[arg(long, value_enum, default_value_t = CliSyncDirection::OneWay)]
        direction: CliSyncDirection,
        /// How to resolve a target row that is newer than its source counterpart (two-way only)
        #[arg(long, value_enum, default_value_t = CliConflictStrategy::LastWriteWins)]
        conflict_strategy: CliConflictStrategy,
        /// Resume from the last persisted checkpoint for this job id, if any
        #[arg(long)]
        resume: bool,
    },
    /// Background the process and re-run `sync` on an interval
    Daemon {
        #[arg(long)]
        job_id: String,
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        target: Option<String>,
        #[arg(long, value_delimiter = ',')]
        tables: Vec<String>,
        #[arg(long, default_value = "public")]
        schema: String,
        #[arg(long, value_enum, default_value_t = CliSyncDirection::OneWay)]
        direction: CliSyncDirection,
        #[arg(long, value_enum, default_value_t = CliConflictStrategy::LastWriteWins)]
        conflict_strategy: CliConflictStrategy,
        /// Seconds between sync passes
        #[arg(long, default_value_t = 30)]
        interval_secs: u64,
        /// Seconds between reconciler passes; omit to disable deletion detection
        #[arg(long)]
        reconcile_interval_secs: Option<u64>,
        /// Stop a running daemon for this job id
        #[arg(long)]
        stop: bool,
        /// Print the running daemon's status and recent log output
        #[arg(long)]
        status: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum CliSyncDirection {
    OneWay,
    TwoWay,
}

impl From<CliSyncDirection> for SyncDirection {
    fn from(v: CliSyncDirection) -> Self {
        match v {
            CliSyncDirection::OneWay => SyncDirection::OneWay,
            CliSyncDirection::TwoWay => SyncDirection::TwoWay,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum CliConflictStrategy {
    LastWriteWins,
    SourceWins,
    TargetWins,
    Manual,
}

impl From<CliConflictStrategy> for ConflictStrategy {
    fn from(v: CliConflictStrategy) -> Self {
        match v {
            CliConflictStrategy::LastWriteWins => ConflictStrategy::LastWriteWins,
            CliConflictStrategy::SourceWins => ConflictStrategy::SourceWins,
            CliConflictStrategy::TargetWins => ConflictStrategy::TargetWins,
            CliConflictStrategy::Manual => ConflictStrategy::Manual,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = match &cli.config_path {
        Some(path) => EngineConfig::load_from_file(path)?,
        None => EngineConfig::load_from_file_or_default("replication-config.toml")?,
    };

    match cli.command {
        Commands::Validate { source, target, tables, schema, skip_preflight } => {
            let ok = commands::run_validate(ValidateArgs {
                source_url: source,
                target_url: target,
                tables,
                schema,
                skip_preflight,
            })
            .await?;
            std::process::exit(if ok { 0 } else { 1 });
        }
        Commands::Diff { source, target, tables, schema, since, sample_size } => {
            let since = since
                .map(|s| chrono::DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&chrono::Utc)))
                .transpose()?;
            commands::run_diff(DiffArgs {
                source_url: source,
                target_url: target,
                tables,
                schema,
                since,
                sample_size,
            })
            .await?;
        }
        Commands::MigratePlan { source, target, tables, schema } => {
            let dangerous = commands::run_migrate_plan(MigratePlanArgs {
                source_url: source,
                target_url: target,
                tables,
                schema,
            })
            .await?;
            std::process::exit(if dangerous { 1 } else { 0 });
        }
        Commands::Sync { job_id, source, target, tables, schema, direction, conflict_strategy, resume } => {
            let result = commands::run_sync(SyncArgs {
                job_id,
                source_url: source,
                target_url: target,
                tables,
                direction: direction.into(),
                conflict_strategy: conflict_strategy.into(),
                schema: Some(schema),
                config,
                resume,
                insecure_tls: cli.allow_self_signed_certs,
            })
            .await?;
            if !result.success {
                std::process::exit(1);
            }
        }
        Commands::Daemon {
            job_id,
            source,
            target,
            tables,
            schema,
            direction,
            conflict_strategy,
            interval_secs,
            reconcile_interval_secs,
            stop,
            status,
        } => {
            let action = if stop {
                DaemonAction::Stop
            } else if status {
                DaemonAction::Status
            } else {
                DaemonAction::Start
            };

            if matches!(action, DaemonAction::Start) && (source.is_none() || target.is_none()) {
                anyhow::bail!("--source and --target are required to start a daemon");
            }

            commands::run_daemon(DaemonArgs {
                action,
                job_id,
                source_url: source.unwrap_or_default(),
                target_url: target.unwrap_or_default(),
                tables,
                direction: direction.into(),
                conflict_strategy: conflict_strategy.into(),
                schema: Some(schema),
                config,
                insecure_tls: cli.allow_self_signed_certs,
                sync_interval: Duration::from_secs(interval_secs),
                reconcile_interval: reconcile_interval_secs.map(Duration::from_secs),
            })
            .await?;
        }
    }

    Ok(())
}
