// ABOUTME: Keyset pagination for streaming rows still needing sync (C5 getRowsToSync)
// ABOUTME: id > afterId ORDER BY id ASC LIMIT batchSize+1 is the sole pagination scheme

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio_postgres::types::ToSql;
use tokio_postgres::Client;
use uuid::Uuid;

use super::types::RowPage;

/// Fetch one page of source rows with `id > after_id` (and `updated_at >=
/// since` when provided), ordered by `id` ascending. Offset pagination is
/// never used: the extra probe row fetched beyond `batch_size` only tells
/// the caller whether another page exists, then is dropped.
pub async fn get_rows_to_sync(
    client: &Client,
    table: &str,
    since: Option<DateTime<Utc>>,
    after_id: Option<Uuid>,
    batch_size: i64,
) -> Result<RowPage> {
    crate::utils::validate_postgres_identifier(table)?;

    let where_clause = build_where_clause(after_id.is_some(), since.is_some());
    let probe_limit = batch_size + 1;
    let query = format!(
        "SELECT * FROM \"{}\" {} ORDER BY id ASC LIMIT {}",
        table, where_clause, probe_limit
    );

    let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();
    if let Some(after_id) = after_id.as_ref() {
        params.push(after_id);
    }
    if let Some(since) = since.as_ref() {
        params.push(since);
    }

    let mut rows = client
        .query(&query, &params)
        .await
        .with_context(|| format!("failed to fetch sync page for {}", table))?;

    let has_more = rows.len() as i64 > batch_size;
    if has_more {
        rows.truncate(batch_size as usize);
    }
    let last_id = rows.last().map(|r| r.get::<_, Uuid>("id").to_string());

    Ok(RowPage { rows, has_more, last_id })
}

/// Pure helper so the WHERE-clause shape is unit-testable without a
/// database: parameter ordering is always `after_id` before `since`.
fn build_where_clause(has_after_id: bool, has_since: bool) -> String {
    let mut clauses = Vec::new();
    let mut idx = 1;
    if has_after_id {
        clauses.push(format!("id > ${}", idx));
        idx += 1;
    }
    if has_since {
        clauses.push(format!("updated_at >= ${}", idx));
    }
    if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_filters_yields_empty_where_clause() {
        assert_eq!(build_where_clause(false, false), "");
    }

    #[test]
    fn after_id_only() {
        assert_eq!(build_where_clause(true, false), "WHERE id > $1");
    }

    #[test]
    fn since_only() {
        assert_eq!(build_where_clause(false, true), "WHERE updated_at >= $1");
    }

    #[test]
    fn after_id_and_since_orders_after_id_first() {
        assert_eq!(
            build_where_clause(true, true),
            "WHERE id > $1 AND updated_at >= $2"
        );
    }
}
