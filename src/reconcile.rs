// ABOUTME: Reconciler - detects deletions the incremental diff engine can't see
// ABOUTME: Periodic full primary-key comparison between source and target, additive to a sync job

use anyhow::{Context, Result};
use std::cmp::Ordering;
use std::collections::HashSet;
use tokio_postgres::types::ToSql;
use tokio_postgres::Client;

use crate::utils::quote_ident;

/// Detects rows present in target but absent from source. The batch sync
/// loop only ever sees rows with `updated_at` advancing, so a row deleted
/// at the source leaves no trace for it to find; this is the
/// supplementary layer that catches that case on its own interval (spec
/// §3 Non-goals note: deletion propagation is explicitly out of the core
/// diff engine and lives here instead).
pub struct Reconciler<'a> {
    source_client: &'a Client,
    target_client: &'a Client,
}

impl<'a> Reconciler<'a> {
    pub fn new(source_client: &'a Client, target_client: &'a Client) -> Self {
        Self { source_client, target_client }
    }

    /// Primary keys present in target but not in source.
    pub async fn find_orphaned_rows(
        &self,
        schema: &str,
        table: &str,
        primary_key_columns: &[String],
    ) -> Result<Vec<Vec<String>>> {
        let source_pks = self
            .get_all_primary_keys(self.source_client, schema, table, primary_key_columns)
            .await
            .context("failed to get source primary keys")?;
        let target_pks = self
            .get_all_primary_keys(self.target_client, schema, table, primary_key_columns)
            .await
            .context("failed to get target primary keys")?;

        let source_set: HashSet<Vec<String>> = source_pks.into_iter().collect();
        let orphaned: Vec<Vec<String>> =
            target_pks.into_iter().filter(|pk| !source_set.contains(pk)).collect();

        tracing::info!(count = orphaned.len(), schema, table, "found orphaned rows pending deletion");
        Ok(orphaned)
    }

    /// Find and delete orphaned rows from target in one call. Loads every
    /// primary key into memory; [`Reconciler::reconcile_table_batched`] is
    /// the memory-bounded alternative for large tables.
    pub async fn reconcile_table(
        &self,
        schema: &str,
        table: &str,
        primary_key_columns: &[String],
    ) -> Result<u64> {
        let orphaned = self.find_orphaned_rows(schema, table, primary_key_columns).await?;
        if orphaned.is_empty() {
            return Ok(0);
        }
        let deleted = delete_rows(self.target_client, schema, table, primary_key_columns, &orphaned).await?;
        tracing::info!(deleted, schema, table, "deleted orphaned rows");
        Ok(deleted)
    }

    async fn get_all_primary_keys(
        &self,
        client: &Client,
        schema: &str,
        table: &str,
        primary_key_columns: &[String],
    ) -> Result<Vec<Vec<String>>> {
        crate::utils::validate_postgres_identifier(table)?;
        let pk_cols: Vec<String> = primary_key_columns.iter().map(|c| format!("{}::text", quote_ident(c))).collect();
        let order_by: Vec<String> = primary_key_columns.iter().map(|c| quote_ident(c)).collect();

        let query = format!(
            "SELECT {} FROM {}.{} ORDER BY {}",
            pk_cols.join(", "),
            quote_ident(schema),
            quote_ident(table),
            order_by.join(", ")
        );
        let rows = client
            .query(&query, &[])
            .await
            .with_context(|| format!("failed to get primary keys from {}.{}", schema, table))?;

        Ok(rows
            .iter()
            .map(|row| (0..primary_key_columns.len()).map(|i| row.get::<_, String>(i)).collect())
            .collect())
    }

    pub async fn get_row_counts(&self, schema: &str, table: &str) -> Result<(i64, i64)> {
        crate::utils::validate_postgres_identifier(table)?;
        let query = format!("SELECT COUNT(*) FROM {}.{}", quote_ident(schema), quote_ident(table));

        let source_count: i64 = self
            .source_client
            .query_one(&query, &[])
            .await
            .context("failed to get source row count")?
            .get(0);
        let target_count: i64 = self
            .target_client
            .query_one(&query, &[])
            .await
            .context("failed to get target row count")?
            .get(0);

        Ok((source_count, target_count))
    }

    pub async fn table_exists_in_target(&self, schema: &str, table: &str) -> Result<bool> {
        let row = self
            .target_client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_schema = $1 AND table_name = $2)",
                &[&schema, &table],
            )
            .await
            .context("failed to check if table exists")?;
        Ok(row.get(0))
    }

    /// Memory-bounded variant: merge-joins primary keys fetched in sorted
    /// batches from both sides instead of loading either table whole.
    pub async fn reconcile_table_batched(
        &self,
        schema: &str,
        table: &str,
        primary_key_columns: &[String],
        batch_size: usize,
    ) -> Result<u64> {
        tracing::info!(schema, table, batch_size, "starting batched reconciliation");

        let mut total_deleted = 0u64;
        let mut orphans_batch: Vec<Vec<String>> = Vec::new();

        let mut source_reader =
            PkBatchReader::new(self.source_client, schema, table, primary_key_columns, batch_size);
        let mut target_reader =
            PkBatchReader::new(self.target_client, schema, table, primary_key_columns, batch_size);

        let mut source_batch = source_reader.fetch_next().await?;
        let mut target_batch = target_reader.fetch_next().await?;
        let mut source_idx = 0;
        let mut target_idx = 0;

        loop {
            if source_idx >= source_batch.len() && !source_reader.exhausted {
                source_batch = source_reader.fetch_next().await?;
                source_idx = 0;
            }
            if target_idx >= target_batch.len() && !target_reader.exhausted {
                target_batch = target_reader.fetch_next().await?;
                target_idx = 0;
            }

            let source_exhausted = source_idx >= source_batch.len();
            let target_exhausted = target_idx >= target_batch.len();

            if source_exhausted && target_exhausted {
                break;
            }

            if source_exhausted {
                while target_idx < target_batch.len() {
                    orphans_batch.push(target_batch[target_idx].clone());
                    target_idx += 1;
                    if orphans_batch.len() >= batch_size {
                        total_deleted +=
                            delete_rows(self.target_client, schema, table, primary_key_columns, &orphans_batch)
                                .await?;
                        orphans_batch.clear();
                    }
                }
                if !target_reader.exhausted {
                    target_batch = target_reader.fetch_next().await?;
                    target_idx = 0;
                }
                continue;
            }

            if target_exhausted {
                break;
            }

            let source_pk = &source_batch[source_idx];
            let target_pk = &target_batch[target_idx];

            match compare_pks(source_pk, target_pk) {
                Ordering::Equal => {
                    source_idx += 1;
                    target_idx += 1;
                }
                Ordering::Less => {
                    source_idx += 1;
                }
                Ordering::Greater => {
                    orphans_batch.push(target_pk.clone());
                    target_idx += 1;
                    if orphans_batch.len() >= batch_size {
                        total_deleted +=
                            delete_rows(self.target_client, schema, table, primary_key_columns, &orphans_batch)
                                .await?;
                        orphans_batch.clear();
                    }
                }
            }
        }

        if !orphans_batch.is_empty() {
            total_deleted +=
                delete_rows(self.target_client, schema, table, primary_key_columns, &orphans_batch).await?;
        }

        tracing::info!(schema, table, total_deleted, "completed batched reconciliation");
        Ok(total_deleted)
    }
}

fn compare_pks(a: &[String], b: &[String]) -> Ordering {
    for (av, bv) in a.iter().zip(b.iter()) {
        match av.cmp(bv) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

/// Delete rows identified by primary key tuples, chunked to stay under
/// PostgreSQL's parameter limit.
async fn delete_rows(
    client: &Client,
    schema: &str,
    table: &str,
    primary_key_columns: &[String],
    pk_values: &[Vec<String>],
) -> Result<u64> {
    if pk_values.is_empty() {
        return Ok(0);
    }
    const DELETE_BATCH_SIZE: usize = 1000;
    let mut total_deleted = 0u64;
    for chunk in pk_values.chunks(DELETE_BATCH_SIZE) {
        let query = build_delete_query(schema, table, primary_key_columns, chunk.len());
        let params: Vec<&(dyn ToSql + Sync)> =
            chunk.iter().flat_map(|row| row.iter().map(|v| v as &(dyn ToSql + Sync))).collect();
        let deleted = client
            .execute(&query, &params)
            .await
            .with_context(|| format!("failed to delete rows from {}.{}", schema, table))?;
        total_deleted += deleted;
    }
    Ok(total_deleted)
}

fn build_delete_query(schema: &str, table: &str, primary_key_columns: &[String], num_rows: usize) -> String {
    let num_pk_cols = primary_key_columns.len();
    let qualified = format!("{}.{}", quote_ident(schema), quote_ident(table));

    if num_pk_cols == 1 {
        let pk_col = quote_ident(&primary_key_columns[0]);
        let placeholders: Vec<String> = (1..=num_rows).map(|i| format!("${}", i)).collect();
        format!("DELETE FROM {} WHERE {} IN ({})", qualified, pk_col, placeholders.join(", "))
    } else {
        let pk_cols: Vec<String> = primary_key_columns.iter().map(|c| quote_ident(c)).collect();
        let value_tuples: Vec<String> = (0..num_rows)
            .map(|row_idx| {
                let placeholders: Vec<String> =
                    (0..num_pk_cols).map(|col_idx| format!("${}", row_idx * num_pk_cols + col_idx + 1)).collect();
                format!("({})", placeholders.join(", "))
            })
            .collect();
        format!("DELETE FROM {} WHERE ({}) IN ({})", qualified, pk_cols.join(", "), value_tuples.join(", "))
    }
}

/// Keyset-paginated primary key reader: `WHERE (pk...) > (last_pk...)
/// ORDER BY pk... LIMIT batch_size`, the same scheme the diff engine uses
/// for row data.
struct PkBatchReader<'a> {
    client: &'a Client,
    schema: String,
    table: String,
    pk_columns: Vec<String>,
    batch_size: usize,
    last_pk: Option<Vec<String>>,
    exhausted: bool,
}

impl<'a> PkBatchReader<'a> {
    fn new(client: &'a Client, schema: &str, table: &str, pk_columns: &[String], batch_size: usize) -> Self {
        Self {
            client,
            schema: schema.to_string(),
            table: table.to_string(),
            pk_columns: pk_columns.to_vec(),
            batch_size,
            last_pk: None,
            exhausted: false,
        }
    }

    async fn fetch_next(&mut self) -> Result<Vec<Vec<String>>> {
        if self.exhausted {
            return Ok(Vec::new());
        }

        let pk_cols_select: Vec<String> = self.pk_columns.iter().map(|c| format!("{}::text", quote_ident(c))).collect();
        let order_by: Vec<String> = self.pk_columns.iter().map(|c| quote_ident(c)).collect();
        let qualified = format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table));

        let query = if self.last_pk.is_some() {
            let pk_tuple: Vec<String> = self.pk_columns.iter().map(|c| quote_ident(c)).collect();
            let params: Vec<String> = (1..=self.pk_columns.len()).map(|i| format!("${}", i)).collect();
            format!(
                "SELECT {} FROM {} WHERE ({}) > ({}) ORDER BY {} LIMIT {}",
                pk_cols_select.join(", "),
                qualified,
                pk_tuple.join(", "),
                params.join(", "),
                order_by.join(", "),
                self.batch_size
            )
        } else {
            format!(
                "SELECT {} FROM {} ORDER BY {} LIMIT {}",
                pk_cols_select.join(", "),
                qualified,
                order_by.join(", "),
                self.batch_size
            )
        };

        let params: Vec<&(dyn ToSql + Sync)> = match &self.last_pk {
            Some(last) => last.iter().map(|s| s as &(dyn ToSql + Sync)).collect(),
            None => Vec::new(),
        };

        let rows = self
            .client
            .query(&query, &params)
            .await
            .with_context(|| format!("failed to fetch PK batch from {}.{}", self.schema, self.table))?;

        if rows.len() < self.batch_size {
            self.exhausted = true;
        }

        let pks: Vec<Vec<String>> =
            rows.iter().map(|row| (0..self.pk_columns.len()).map(|i| row.get::<_, String>(i)).collect()).collect();

        if let Some(last_row) = pks.last() {
            self.last_pk = Some(last_row.clone());
        }

        Ok(pks)
    }
}

#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    pub delete_orphans: bool,
    pub max_deletes: Option<usize>,
    pub skip_tables: Vec<String>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self { delete_orphans: true, max_deletes: None, skip_tables: Vec::new() }
    }
}

#[derive(Debug, Clone)]
pub struct ReconcileResult {
    pub schema: String,
    pub table: String,
    pub source_count: i64,
    pub target_count: i64,
    pub orphaned_count: usize,
    pub deleted_count: u64,
}

impl ReconcileResult {
    pub fn is_in_sync(&self) -> bool {
        self.source_count == self.target_count && self.orphaned_count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconcile_config_default_deletes_orphans() {
        let config = ReconcileConfig::default();
        assert!(config.delete_orphans);
        assert!(config.max_deletes.is_none());
    }

    #[test]
    fn reconcile_result_in_sync_requires_matching_counts_and_no_orphans() {
        let result = ReconcileResult {
            schema: "public".to_string(),
            table: "users".to_string(),
            source_count: 100,
            target_count: 100,
            orphaned_count: 0,
            deleted_count: 0,
        };
        assert!(result.is_in_sync());
    }

    #[test]
    fn reconcile_result_not_in_sync_when_counts_diverge() {
        let result = ReconcileResult {
            schema: "public".to_string(),
            table: "users".to_string(),
            source_count: 100,
            target_count: 105,
            orphaned_count: 5,
            deleted_count: 0,
        };
        assert!(!result.is_in_sync());
    }

    #[test]
    fn build_delete_query_single_pk_uses_in_list() {
        let query = build_delete_query("public", "users", &["id".to_string()], 3);
        assert!(query.contains("WHERE \"id\" IN ($1, $2, $3)"));
    }

    #[test]
    fn build_delete_query_composite_pk_uses_tuple_in_list() {
        let query = build_delete_query("public", "order_items", &["order_id".to_string(), "item_id".to_string()], 2);
        assert!(query.contains("WHERE (\"order_id\", \"item_id\") IN"));
        assert!(query.contains("($1, $2), ($3, $4)"));
    }
}
