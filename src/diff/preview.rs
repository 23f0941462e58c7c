// ABOUTME: Per-table diff preview (C5 calculateDiff) - counts and samples inserts/updates
// ABOUTME: id-set difference for inserts, paged updated_at comparison for updates

use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio_postgres::Client;
use uuid::Uuid;

use super::types::TableDiff;

const INTERSECTION_PAGE_SIZE: usize = 1000;

/// Compare `table` between `source` and `target`: rows present in source
/// but not target are "inserts", rows present in both where
/// `source.updated_at > target.updated_at` are "updates".
pub async fn calculate_diff(
    source: &Client,
    target: &Client,
    table: &str,
    since: Option<DateTime<Utc>>,
    sample_size: usize,
) -> Result<TableDiff> {
    crate::utils::validate_postgres_identifier(table)?;

    let source_ids = fetch_id_set(source, table, since).await?;
    let target_ids = fetch_id_set(target, table, None).await?;

    let mut inserts = 0i64;
    let mut sample_inserts = Vec::new();
    for id in &source_ids {
        if !target_ids.contains(id) {
            inserts += 1;
            if sample_inserts.len() < sample_size {
                sample_inserts.push(id.to_string());
            }
        }
    }

    let intersection: Vec<Uuid> = source_ids
        .iter()
        .filter(|id| target_ids.contains(*id))
        .cloned()
        .collect();
    let (updates, sample_updates) =
        count_updates(source, target, table, &intersection, sample_size).await?;

    let source_row_count = count_rows(source, table).await?;
    let target_row_count = count_rows(target, table).await?;

    Ok(TableDiff {
        table_name: table.to_string(),
        inserts,
        updates,
        source_row_count,
        target_row_count,
        sample_inserts,
        sample_updates,
    })
}

async fn fetch_id_set(
    client: &Client,
    table: &str,
    since: Option<DateTime<Utc>>,
) -> Result<HashSet<Uuid>> {
    let rows = match since {
        Some(since) => {
            client
                .query(
                    &format!("SELECT id FROM \"{}\" WHERE updated_at >= $1", table),
                    &[&since],
                )
                .await
        }
        None => client.query(&format!("SELECT id FROM \"{}\"", table), &[]).await,
    }
    .with_context(|| format!("failed to fetch id set for {}", table))?;

    Ok(rows.iter().map(|r| r.get::<_, Uuid>(0)).collect())
}

async fn count_rows(client: &Client, table: &str) -> Result<i64> {
    let row = client
        .query_one(&format!("SELECT COUNT(*) FROM \"{}\"", table), &[])
        .await
        .with_context(|| format!("failed to count rows in {}", table))?;
    Ok(row.get(0))
}

async fn count_updates(
    source: &Client,
    target: &Client,
    table: &str,
    ids: &[Uuid],
    sample_size: usize,
) -> Result<(i64, Vec<String>)> {
    let mut updates = 0i64;
    let mut samples = Vec::new();

    for chunk in ids.chunks(INTERSECTION_PAGE_SIZE) {
        let source_map = fetch_updated_at_map(source, table, chunk).await?;
        let target_map = fetch_updated_at_map(target, table, chunk).await?;

        for id in chunk {
            if let (Some(s_ts), Some(t_ts)) = (source_map.get(id), target_map.get(id)) {
                if s_ts > t_ts {
                    updates += 1;
                    if samples.len() < sample_size {
                        samples.push(id.to_string());
                    }
                }
            }
        }
    }

    Ok((updates, samples))
}

async fn fetch_updated_at_map(
    client: &Client,
    table: &str,
    ids: &[Uuid],
) -> Result<HashMap<Uuid, DateTime<Utc>>> {
    let rows = client
        .query(
            &format!("SELECT id, updated_at FROM \"{}\" WHERE id = ANY($1)", table),
            &[&ids],
        )
        .await
        .with_context(|| format!("failed to fetch updated_at page for {}", table))?;

    Ok(rows
        .iter()
        .map(|r| (r.get::<_, Uuid>(0), r.get::<_, Option<DateTime<Utc>>>(1)))
        .map(|(id, ts)| (id, ts.unwrap_or(DateTime::<Utc>::MIN_UTC)))
        .collect())
}
