// ABOUTME: Sync Executor (C10) - the orchestrator tying connection, schema, diff, idempotency,
// ABOUTME: metrics, rate limiting, backup and retry primitives into one resumable job

pub mod sql;
pub mod types;

pub use types::{
    Conflict, ConflictStrategy, JobOptions, SkippedReasons, SyncDirection, SyncResult, TableConfig,
    TableSyncResult,
};

use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tokio_postgres::IsolationLevel;
use uuid::Uuid;

use crate::backup::{self, BackupMetadata};
use crate::config::EngineConfig;
use crate::connection::Connection;
use crate::control::JobControl;
use crate::diff::get_rows_to_sync;
use crate::error::{classify, ErrorClass};
use crate::idempotency::{IdempotencyTracker, Operation, ProcessedRow};
use crate::metrics::{JobStatus, MetricsCollector, MetricsStore};
use crate::progress::{LogLevel, LogSink, SyncCheckpoint, SyncProgress, TracingLogSink};
use crate::ratelimit::RateLimiter;
use crate::retry::{with_timeout, RetryConfig};
use crate::row::{row_to_ordered, OrderedRow, Value};
use crate::schema::{self, DatabaseSchema};
use crate::validate::graph::{build_graph, find_cycle_members, topological_order};

/// Rows whose estimated size exceeds this never enter the multi-value
/// bulk upsert; they're sent through the target one at a time instead
/// (spec §4.9.4 step 7 / §4.9.5).
const MAX_BULK_ROW_BYTES: usize = 1024 * 1024;

/// Orchestrates one call to [`SyncExecutor::execute`]: owns neither
/// connection beyond the call's lifetime, and holds no state across jobs
/// except what the caller threads back in via `JobOptions::checkpoint`.
pub struct SyncExecutor {
    config: EngineConfig,
    idempotency: Arc<IdempotencyTracker>,
    metrics_store: Option<Arc<dyn MetricsStore>>,
    log_sink: Arc<dyn LogSink>,
    accept_invalid_certs: bool,
}

impl SyncExecutor {
    pub fn new(config: EngineConfig) -> Self {
        SyncExecutor {
            config,
            idempotency: Arc::new(IdempotencyTracker::no_op()),
            metrics_store: None,
            log_sink: Arc::new(TracingLogSink),
            accept_invalid_certs: false,
        }
    }

    pub fn with_idempotency(mut self, tracker: Arc<IdempotencyTracker>) -> Self {
        self.idempotency = tracker;
        self
    }

    pub fn with_metrics_store(mut self, store: Arc<dyn MetricsStore>) -> Self {
        self.metrics_store = Some(store);
        self
    }

    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = sink;
        self
    }

    /// Relaxes TLS certificate validation on both connections this job
    /// opens, for self-signed or otherwise untrusted certificates.
    pub fn with_insecure_tls(mut self, accept_invalid_certs: bool) -> Self {
        self.accept_invalid_certs = accept_invalid_certs;
        self
    }

    /// Run one sync job to completion or to its first fatal error (spec
    /// §4.9.1-§4.9.7). Never panics on a bad row: individual row failures
    /// are counted and logged, not propagated, so one malformed row never
    /// aborts an otherwise-healthy table.
    pub async fn execute(&self, opts: JobOptions) -> Result<SyncResult> {
        let enabled_tables: Vec<TableConfig> = opts.tables.iter().filter(|t| t.enabled).cloned().collect();
        if enabled_tables.is_empty() {
            bail!("no enabled tables in job options");
        }
        crate::utils::validate_source_target_different(&opts.source_url, &opts.target_url)?;

        let control = JobControl::new(Some(self.config.job_timeout()));
        let retry_cfg = RetryConfig {
            max_retries: self.config.max_retries,
            initial_delay: self.config.retry_delay(),
            ..RetryConfig::default()
        };

        let (mut source, mut target) = tokio::try_join!(
            Connection::connect(&opts.source_url, self.accept_invalid_certs, &retry_cfg),
            Connection::connect(&opts.target_url, self.accept_invalid_certs, &retry_cfg),
        )
        .context("failed to open source/target connections")?;

        let mut metrics = MetricsCollector::new(opts.job_id.clone());
        let rate_limiter = RateLimiter::new(self.config.rate_limit.clone());

        self.log_sink.log(
            LogLevel::Info,
            &format!("sync job {} starting ({} tables)", opts.job_id, enabled_tables.len()),
            None,
        );

        let table_names: Vec<String> = enabled_tables.iter().map(|t| t.table_name.clone()).collect();

        let is_fresh_run = opts.checkpoint.is_none();
        let mut backup_metadata: Option<BackupMetadata> = None;
        if is_fresh_run {
            self.log_sink.log(LogLevel::Info, "taking pre-sync target backup", None);
            let meta = backup::create_backup(&opts.target_url, &opts.job_id, target.sanitized_url(), &table_names).await?;
            backup_metadata = Some(meta);
        }

        let source_schema = schema::inspect(source.client(), opts.schema_name())
            .await
            .context("failed to inspect source schema")?;
        let target_schema = schema::inspect(target.client(), opts.schema_name())
            .await
            .context("failed to inspect target schema")?;

        let order = self.order_tables(&table_names, &source_schema);
        self.defer_constraints_for_cycles(&table_names, &source_schema, target.client()).await;

        let mut tables: std::collections::HashMap<String, TableSyncResult> = Default::default();
        let mut conflicts: Vec<Conflict> = Vec::new();
        let mut latest_checkpoint: Option<SyncCheckpoint> = None;

        let mut processed_tables: Vec<String> = opts
            .checkpoint
            .as_ref()
            .map(|c| c.processed_tables.clone())
            .unwrap_or_default();
        let resume_table = opts.checkpoint.as_ref().map(|c| c.last_table.clone());

        let mut fatal: Option<anyhow::Error> = None;
        let mut total_rows_so_far: u64 = 0;

        'tables: for table_name in &order {
            if processed_tables.contains(table_name) {
                continue;
            }
            let Some(source_table) = source_schema.table(table_name) else {
                continue;
            };
            if !source_table.is_syncable() {
                self.log_sink.log(
                    LogLevel::Warn,
                    &format!("table '{}' is not syncable (requires uuid id + timestamp updated_at); skipping", table_name),
                    None,
                );
                continue;
            }
            let Some(target_table) = target_schema.table(table_name) else {
                self.log_sink.log(LogLevel::Warn, &format!("table '{}' absent on target; skipping", table_name), None);
                continue;
            };

            let strategy = enabled_tables
                .iter()
                .find(|t| &t.table_name == table_name)
                .map(|t| t.strategy())
                .unwrap_or_default();

            metrics.start_table(table_name);
            self.log_sink.log(LogLevel::Info, &format!("starting table '{}'", table_name), None);

            let table_row_count = count_table_rows(source.client(), table_name).await.unwrap_or(0);
            total_rows_so_far += table_row_count;

            let (mut after_id, since) = if resume_table.as_deref() == Some(table_name.as_str()) {
                let checkpoint = opts.checkpoint.as_ref().unwrap();
                let after_id = checkpoint
                    .last_row_id
                    .as_deref()
                    .and_then(|s| Uuid::parse_str(s).ok());
                let since = checkpoint
                    .last_updated_at
                    .as_deref()
                    .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&Utc));
                (after_id, since)
            } else {
                (None, None)
            };

            let table_result = tables.entry(table_name.clone()).or_default();
            let mut rows_since_checkpoint: u32 = 0;

            loop {
                if control.should_stop() {
                    break 'tables;
                }

                let batch_start = Instant::now();
                let page = match with_timeout(
                    self.config.batch_timeout(),
                    get_rows_to_sync(source.client(), table_name, since, after_id, self.config.batch_size as i64),
                )
                .await
                {
                    Ok(page) => page,
                    Err(e) => {
                        if matches!(classify(&e), ErrorClass::Fatal) {
                            fatal = Some(e);
                            break 'tables;
                        }
                        table_result.record_error_message(e.to_string());
                        table_result.skipped.error += 1;
                        metrics.record_error();
                        break;
                    }
                };

                if page.rows.is_empty() {
                    break;
                }

                let mut ordered_rows = Vec::with_capacity(page.rows.len());
                for row in &page.rows {
                    match row_to_ordered(row, &source_table.columns) {
                        Ok(ordered) => ordered_rows.push(ordered),
                        Err(e) => {
                            table_result.record_error_message(e.to_string());
                            table_result.skipped.error += 1;
                        }
                    }
                }

                let estimated_bytes: f64 = ordered_rows.iter().map(|r| r.estimate_size() as f64).sum();
                rate_limiter.acquire_permit(ordered_rows.len() as f64, estimated_bytes).await;

                let skipped_before_batch = table_result.total_skipped();

                let (tagged_rows, no_id_count) = tag_ids(ordered_rows);
                table_result.skipped.no_id += no_id_count;

                let ids: Vec<Uuid> = tagged_rows.iter().map(|(id, _)| *id).collect();
                let existing = fetch_target_state(target.client(), table_name, &ids)
                    .await
                    .with_context(|| format!("failed to read target state for '{}'", table_name))?;

                let already_processed = self
                    .idempotency
                    .get_processed_row_ids(
                        &opts.job_id,
                        table_name,
                        &ids.iter().map(|id| id.to_string()).collect::<Vec<_>>(),
                    )
                    .await?;

                let mut to_insert: Vec<(Uuid, OrderedRow)> = Vec::new();
                let mut to_update: Vec<(Uuid, OrderedRow)> = Vec::new();

                for (id, row) in tagged_rows {
                    if already_processed.contains(&id.to_string()) {
                        table_result.skipped.already_synced += 1;
                        continue;
                    }
                    match existing.get(&id) {
                        None => to_insert.push((id, row)),
                        Some(target_updated_at) => {
                            let Some(source_updated_at) = row_updated_at(&row) else {
                                table_result.record_error_message(format!("row {} has no usable updated_at on source", id));
                                table_result.skipped.error += 1;
                                continue;
                            };
                            if opts.direction == SyncDirection::TwoWay && *target_updated_at > source_updated_at {
                                match strategy {
                                    ConflictStrategy::SourceWins => to_update.push((id, row)),
                                    ConflictStrategy::TargetWins | ConflictStrategy::LastWriteWins => {
                                        table_result.skipped.conflict += 1;
                                    }
                                    ConflictStrategy::Manual => {
                                        table_result.skipped.conflict += 1;
                                        let target_data = match fetch_target_row(
                                            target.client(),
                                            table_name,
                                            &target_table.columns,
                                            &id,
                                        )
                                        .await
                                        {
                                            Ok(Some(target_row)) => ordered_row_to_json(&target_row),
                                            Ok(None) => serde_json::Value::Null,
                                            Err(e) => {
                                                table_result.record_error_message(e.to_string());
                                                serde_json::Value::Null
                                            }
                                        };
                                        conflicts.push(Conflict {
                                            id: Uuid::new_v4().to_string(),
                                            table_name: table_name.clone(),
                                            row_id: id.to_string(),
                                            source_data: ordered_row_to_json(&row),
                                            target_data,
                                            source_updated_at,
                                            target_updated_at: *target_updated_at,
                                        });
                                    }
                                }
                            } else if source_updated_at > *target_updated_at {
                                // Strictly `>`: equal timestamps are a no-op, which is
                                // what makes a re-run idempotent (spec §4.9.5).
                                to_update.push((id, row));
                            } else {
                                table_result.skipped.already_synced += 1;
                            }
                        }
                    }
                }

                let insert_columns: Vec<String> = source_table
                    .insertable_columns()
                    .iter()
                    .map(|c| c.name.clone())
                    .collect();

                let mut processed_rows: Vec<ProcessedRow> = Vec::new();
                let mut batch_inserted = 0u64;
                let mut batch_updated = 0u64;
                let mut batch_errors = 0u64;

                let (bulk_insert, oversized_insert): (Vec<_>, Vec<_>) = to_insert
                    .into_iter()
                    .partition(|(_, row)| row.estimate_size() <= MAX_BULK_ROW_BYTES);

                for chunk in bulk_insert.chunks(self.config.bulk_insert_size as usize) {
                    match self
                        .insert_chunk(target.client_mut(), table_name, &insert_columns, chunk)
                        .await
                    {
                        Ok(n) => {
                            batch_inserted += n;
                            for (id, _) in chunk {
                                processed_rows.push(ProcessedRow {
                                    sync_job_id: opts.job_id.clone(),
                                    table_name: table_name.clone(),
                                    row_id: id.to_string(),
                                    operation: Operation::Insert,
                                    batch_id: None,
                                    processed_at: Utc::now(),
                                });
                            }
                        }
                        Err(e) => {
                            table_result.record_error_message(e.to_string());
                            batch_errors += chunk.len() as u64;
                            table_result.skipped.error += chunk.len() as u64;
                        }
                    }
                }

                for (id, row) in &oversized_insert {
                    match self
                        .insert_oversized_row(target.client_mut(), table_name, &insert_columns, id, row)
                        .await
                    {
                        Ok(()) => {
                            batch_inserted += 1;
                            processed_rows.push(ProcessedRow {
                                sync_job_id: opts.job_id.clone(),
                                table_name: table_name.clone(),
                                row_id: id.to_string(),
                                operation: Operation::Insert,
                                batch_id: None,
                                processed_at: Utc::now(),
                            });
                        }
                        Err(e) => {
                            table_result.record_error_message(e.to_string());
                            batch_errors += 1;
                            table_result.skipped.error += 1;
                        }
                    }
                }

                let update_columns: Vec<String> = source_table
                    .insertable_columns()
                    .iter()
                    .filter(|c| c.name != "id")
                    .map(|c| c.name.clone())
                    .collect();

                for (id, row) in &to_update {
                    match self.update_row(target.client_mut(), table_name, &update_columns, id, row).await {
                        Ok(()) => {
                            batch_updated += 1;
                            processed_rows.push(ProcessedRow {
                                sync_job_id: opts.job_id.clone(),
                                table_name: table_name.clone(),
                                row_id: id.to_string(),
                                operation: Operation::Update,
                                batch_id: None,
                                processed_at: Utc::now(),
                            });
                        }
                        Err(e) => {
                            table_result.record_error_message(e.to_string());
                            batch_errors += 1;
                            table_result.skipped.error += 1;
                        }
                    }
                }

                self.idempotency.mark_rows_processed(&processed_rows).await?;

                table_result.inserted += batch_inserted;
                table_result.updated += batch_updated;

                let batch_skipped = table_result.total_skipped() - skipped_before_batch;
                let batch_ms = batch_start.elapsed().as_millis() as u64;
                metrics.record_batch(table_name, page.rows.len() as u64, batch_ms, batch_inserted, batch_updated, batch_skipped, batch_errors, 0);
                rate_limiter.record_response_time(batch_ms);

                after_id = page.last_id.as_deref().and_then(|s| Uuid::parse_str(s).ok()).or(after_id);
                rows_since_checkpoint += page.rows.len() as u32;

                if rows_since_checkpoint >= self.config.checkpoint_interval {
                    rows_since_checkpoint = 0;
                    let checkpoint = SyncCheckpoint {
                        last_table: table_name.clone(),
                        last_row_id: after_id.map(|id| id.to_string()),
                        last_updated_at: Some(Utc::now().to_rfc3339()),
                        processed_tables: processed_tables.clone(),
                    };
                    self.log_sink.checkpoint(&checkpoint);
                    latest_checkpoint = Some(checkpoint);
                }

                self.log_sink.progress(&SyncProgress {
                    total_tables: order.len(),
                    completed_tables: processed_tables.len(),
                    current_table: Some(table_name.clone()),
                    total_rows: total_rows_so_far,
                    processed_rows: metrics.rows_processed(),
                    inserted_rows: metrics.rows_inserted(),
                    updated_rows: metrics.rows_updated(),
                    skipped_rows: metrics.rows_skipped(),
                    errors: metrics.errors(),
                });

                if !page.has_more {
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }

            metrics.complete_table(table_name);
            processed_tables.push(table_name.clone());
        }

        let status = if fatal.is_some() { JobStatus::Failed } else { JobStatus::Completed };
        let metrics_record = metrics
            .complete(status, self.metrics_store.as_deref())
            .await
            .context("failed to finalize metrics")?;

        let success = if let Some(err) = fatal {
            self.log_sink.log(LogLevel::Error, &format!("sync job {} hit a fatal error: {}", opts.job_id, err), None);
            if let Some(mut meta) = backup_metadata {
                if meta.status == backup::BackupStatus::Completed {
                    self.log_sink.log(LogLevel::Warn, "restoring target from pre-sync backup", None);
                    if let Err(restore_err) = backup::restore_backup(&opts.target_url, &mut meta).await {
                        self.log_sink.log(LogLevel::Error, &format!("rollback restore failed: {}", restore_err), None);
                    }
                }
            }
            false
        } else {
            true
        };

        let checkpoint = if success { None } else { latest_checkpoint };
        self.log_sink.complete(success, checkpoint.as_ref());
        source.close();
        target.close();
        Ok(SyncResult {
            job_id: opts.job_id.clone(),
            success,
            checkpoint,
            tables,
            conflicts,
            metrics: metrics_record,
        })
    }

    fn order_tables(&self, table_names: &[String], source_schema: &DatabaseSchema) -> Vec<String> {
        let edges: Vec<(String, String)> = table_names
            .iter()
            .filter_map(|name| source_schema.table(name))
            .flat_map(|t| {
                t.foreign_keys
                    .iter()
                    .map(move |fk| (t.table_name.clone(), fk.referenced_table.clone()))
            })
            .collect();
        let graph = build_graph(table_names, &edges);
        topological_order(table_names, &graph)
    }

    /// Best-effort: attempt to relax FK checking for the lifetime of this
    /// job's transactions on any table involved in a dependency cycle.
    /// Failure here (e.g. a constraint declared `NOT DEFERRABLE`) is logged
    /// and otherwise ignored — cyclic tables simply risk an FK violation on
    /// insert, which the per-row fallback path then reports as a normal
    /// row error rather than aborting the job.
    async fn defer_constraints_for_cycles(
        &self,
        table_names: &[String],
        source_schema: &DatabaseSchema,
        target_client: &tokio_postgres::Client,
    ) {
        let edges: Vec<(String, String)> = table_names
            .iter()
            .filter_map(|name| source_schema.table(name))
            .flat_map(|t| {
                t.foreign_keys
                    .iter()
                    .map(move |fk| (t.table_name.clone(), fk.referenced_table.clone()))
            })
            .collect();
        let graph = build_graph(table_names, &edges);
        let cycle_members = find_cycle_members(table_names, &graph);
        if cycle_members.is_empty() {
            return;
        }
        if let Err(e) = target_client.batch_execute("SET CONSTRAINTS ALL DEFERRED").await {
            self.log_sink.log(
                LogLevel::Warn,
                &format!("could not defer constraints for cyclic tables {:?}: {}", cycle_members, e),
                None,
            );
        }
    }

    async fn insert_chunk(
        &self,
        target_client: &mut tokio_postgres::Client,
        table_name: &str,
        columns: &[String],
        chunk: &[(Uuid, OrderedRow)],
    ) -> Result<u64> {
        let rows: Vec<OrderedRow> = chunk.iter().map(|(_, r)| r.clone()).collect();
        let sql = sql::build_bulk_upsert_sql(table_name, columns, rows.len());
        let params = sql::bind_insert_params(&rows, columns);

        let txn = target_client
            .build_transaction()
            .isolation_level(IsolationLevel::Serializable)
            .start()
            .await
            .context("failed to start SERIALIZABLE transaction")?;

        match txn.execute(&sql, &params).await {
            Ok(_) => {
                txn.commit().await.context("failed to commit insert chunk")?;
                Ok(rows.len() as u64)
            }
            Err(e) => {
                let _ = txn.rollback().await;
                self.insert_rows_one_by_one(target_client, table_name, columns, chunk, e).await
            }
        }
    }

    /// Bulk insert failed (most likely one bad row in an otherwise healthy
    /// chunk); retry every row individually so the rest of the chunk still
    /// lands.
    async fn insert_rows_one_by_one(
        &self,
        target_client: &tokio_postgres::Client,
        table_name: &str,
        columns: &[String],
        chunk: &[(Uuid, OrderedRow)],
        bulk_error: tokio_postgres::Error,
    ) -> Result<u64> {
        tracing::warn!(table = table_name, error = %bulk_error, "bulk insert failed, falling back to per-row inserts");
        let sql = sql::build_bulk_upsert_sql(table_name, columns, 1);
        let mut inserted = 0u64;
        for (id, row) in chunk {
            let params = sql::bind_insert_params(std::slice::from_ref(row), columns);
            match target_client.execute(&sql, &params).await {
                Ok(_) => inserted += 1,
                Err(e) => {
                    tracing::warn!(table = table_name, row_id = %id, error = %e, "row insert failed");
                }
            }
        }
        Ok(inserted)
    }

    /// Single-row upsert for rows over [`MAX_BULK_ROW_BYTES`] — these never
    /// touch the multi-value bulk path, so a failure here is just this row's
    /// failure, not a bulk chunk falling back.
    async fn insert_oversized_row(
        &self,
        target_client: &mut tokio_postgres::Client,
        table_name: &str,
        columns: &[String],
        id: &Uuid,
        row: &OrderedRow,
    ) -> Result<()> {
        let sql = sql::build_bulk_upsert_sql(table_name, columns, 1);
        let params = sql::bind_insert_params(std::slice::from_ref(row), columns);

        let txn = target_client
            .build_transaction()
            .isolation_level(IsolationLevel::Serializable)
            .start()
            .await
            .context("failed to start SERIALIZABLE transaction")?;

        match txn.execute(&sql, &params).await {
            Ok(_) => {
                txn.commit().await.context("failed to commit oversized row insert")?;
                Ok(())
            }
            Err(e) => {
                let _ = txn.rollback().await;
                Err(e).with_context(|| format!("failed to insert oversized row {} in '{}'", id, table_name))
            }
        }
    }

    async fn update_row(
        &self,
        target_client: &mut tokio_postgres::Client,
        table_name: &str,
        set_columns: &[String],
        id: &Uuid,
        row: &OrderedRow,
    ) -> Result<()> {
        let sql = sql::build_update_sql(table_name, set_columns);
        let id_value = Value::Str(id.to_string());
        let params = sql::bind_update_params(row, &id_value, set_columns);

        let txn = target_client
            .build_transaction()
            .isolation_level(IsolationLevel::Serializable)
            .start()
            .await
            .context("failed to start SERIALIZABLE transaction")?;
        txn.execute(&sql, &params).await.context("failed to update row")?;
        txn.commit().await.context("failed to commit update")?;
        Ok(())
    }
}

/// Split rows by whether their `id` column is present and non-null,
/// tagging survivors with the parsed `Uuid` the rest of the batch loop
/// keys everything off of. Rows with a missing id are skipped via
/// `skippedReasons.noId`, never treated as an error.
fn tag_ids(rows: Vec<OrderedRow>) -> (Vec<(Uuid, OrderedRow)>, u64) {
    let mut tagged = Vec::with_capacity(rows.len());
    let mut no_id = 0u64;
    for row in rows {
        match row.get("id") {
            Some(Value::Str(s)) => match Uuid::parse_str(s) {
                Ok(id) => tagged.push((id, row)),
                Err(_) => no_id += 1,
            },
            _ => no_id += 1,
        }
    }
    (tagged, no_id)
}

/// `None` means the source row has no usable `updated_at` (missing or
/// `NULL`) — spec §4.9.5 pins this as skip-error, never a `now()` fallback
/// that would let a dateless row win a conflict it has no claim to.
fn row_updated_at(row: &OrderedRow) -> Option<chrono::DateTime<Utc>> {
    match row.get("updated_at") {
        Some(Value::Timestamp(ts)) => Some(*ts),
        _ => None,
    }
}

fn ordered_row_to_json(row: &OrderedRow) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for column in row.columns() {
        let value = row.get(column).unwrap_or(&Value::Null);
        map.insert(column.clone(), value_to_json(value));
    }
    serde_json::Value::Object(map)
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::I64(n) => serde_json::Value::from(*n),
        Value::F64(n) => serde_json::Number::from_f64(*n).map(serde_json::Value::Number).unwrap_or(serde_json::Value::Null),
        Value::Str(s) => serde_json::Value::String(s.clone()),
        Value::Bytes(b) => serde_json::Value::String(base64_encode(b)),
        Value::Timestamp(ts) => serde_json::Value::String(ts.to_rfc3339()),
        Value::Json(j) => j.clone(),
    }
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Bulk-fetch `id -> updated_at` for every id already present on the
/// target, so the batch loop can partition rows into insert/update lanes
/// without a query per row.
async fn fetch_target_state(
    target_client: &tokio_postgres::Client,
    table_name: &str,
    ids: &[Uuid],
) -> Result<std::collections::HashMap<Uuid, chrono::DateTime<Utc>>> {
    crate::utils::validate_postgres_identifier(table_name)?;
    let mut out = std::collections::HashMap::new();
    if ids.is_empty() {
        return Ok(out);
    }
    let query = format!(
        "SELECT id, updated_at FROM \"{}\" WHERE id = ANY($1)",
        table_name
    );
    let rows = target_client
        .query(&query, &[&ids])
        .await
        .with_context(|| format!("failed to read existing rows for '{}'", table_name))?;
    for row in rows {
        let id: Uuid = row.get("id");
        let updated_at: Option<chrono::DateTime<Utc>> = row.get("updated_at");
        out.insert(id, updated_at.unwrap_or(chrono::DateTime::<Utc>::MIN_UTC));
    }
    Ok(out)
}

/// Source row count for a table, used as the progress denominator (spec
/// §4.9.3). Estimated counts are for the schema inspector's catalog-driven
/// snapshot, not this per-table `COUNT(*)`, which the spec calls for here.
async fn count_table_rows(client: &tokio_postgres::Client, table_name: &str) -> Result<u64> {
    crate::utils::validate_postgres_identifier(table_name)?;
    let row = client
        .query_one(&format!("SELECT COUNT(*) FROM \"{}\"", table_name), &[])
        .await
        .with_context(|| format!("failed to count source rows for '{}'", table_name))?;
    let count: i64 = row.get(0);
    Ok(count.max(0) as u64)
}

/// Fetch the full current target row for a manual-strategy conflict, so
/// `Conflict::target_data` carries the actual payload rather than `null`.
async fn fetch_target_row(
    target_client: &tokio_postgres::Client,
    table_name: &str,
    columns: &[crate::schema::DetailedColumn],
    id: &Uuid,
) -> Result<Option<OrderedRow>> {
    crate::utils::validate_postgres_identifier(table_name)?;
    let query = format!("SELECT * FROM \"{}\" WHERE id = $1", table_name);
    let row = target_client
        .query_opt(&query, &[id])
        .await
        .with_context(|| format!("failed to read target row for '{}'", table_name))?;
    row.map(|r| row_to_ordered(&r, columns)).transpose()
}
