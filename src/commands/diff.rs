// ABOUTME: `diff` subcommand - per-table insert/update counts between source and target (C5)

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::diff;
use crate::postgres;
use crate::schema;

pub struct DiffArgs {
    pub source_url: String,
    pub target_url: String,
    pub tables: Vec<String>,
    pub schema: String,
    pub since: Option<DateTime<Utc>>,
    pub sample_size: usize,
}

/// Prints a per-table diff summary. Returns the
/// total number of rows needing sync across all tables, for scripting.
pub async fn run_diff(args: DiffArgs) -> Result<i64> {
    let source_client = postgres::connect_with_retry(&args.source_url)
        .await
        .context("failed to connect to source")?;
    let target_client = postgres::connect_with_retry(&args.target_url)
        .await
        .context("failed to connect to target")?;

    let tables = if args.tables.is_empty() {
        let source_schema = schema::inspect(&source_client, &args.schema)
            .await
            .context("failed to inspect source schema")?;
        source_schema
            .syncable_tables()
            .iter()
            .map(|t| t.table_name.clone())
            .collect()
    } else {
        args.tables
    };

    let mut total_pending = 0i64;
    println!("{:<32} {:>10} {:>10} {:>12} {:>12}", "table", "inserts", "updates", "source_rows", "target_rows");
    println!("{}", "-".repeat(80));

    for table in &tables {
        let table_diff = diff::calculate_diff(
            &source_client,
            &target_client,
            table,
            args.since,
            args.sample_size,
        )
        .await
        .with_context(|| format!("failed to diff table '{}'", table))?;

        println!(
            "{:<32} {:>10} {:>10} {:>12} {:>12}",
            table_diff.table_name,
            table_diff.inserts,
            table_diff.updates,
            table_diff.source_row_count,
            table_diff.target_row_count,
        );
        for id in &table_diff.sample_inserts {
            println!("    + insert: {}", id);
        }
        for id in &table_diff.sample_updates {
            println!("    ~ update: {}", id);
        }

        total_pending += table_diff.inserts + table_diff.updates;
    }

    println!();
    println!("total pending rows: {}", total_pending);

    Ok(total_pending)
}
