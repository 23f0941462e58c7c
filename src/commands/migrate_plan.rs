// ABOUTME: `migrate-plan` subcommand - prints the idempotent DDL the migration planner proposes (C4)
// ABOUTME: Never executes DDL itself; the planner is advisory-only

use anyhow::{Context, Result};

use crate::migration;
use crate::postgres;
use crate::schema;

pub struct MigratePlanArgs {
    pub source_url: String,
    pub target_url: String,
    pub tables: Vec<String>,
    pub schema: String,
}

/// Prints an ordered, idempotent DDL plan aligning target to source.
/// Returns `true` when any step is marked Dangerous, so callers can require
/// an extra confirmation before the operator runs the printed SQL by hand.
pub async fn run_migrate_plan(args: MigratePlanArgs) -> Result<bool> {
    let source_client = postgres::connect_with_retry(&args.source_url)
        .await
        .context("failed to connect to source")?;
    let target_client = postgres::connect_with_retry(&args.target_url)
        .await
        .context("failed to connect to target")?;

    let source_schema = schema::inspect(&source_client, &args.schema)
        .await
        .context("failed to inspect source schema")?;
    let target_schema = schema::inspect(&target_client, &args.schema)
        .await
        .context("failed to inspect target schema")?;

    let tables = if args.tables.is_empty() {
        source_schema
            .syncable_tables()
            .iter()
            .map(|t| t.table_name.clone())
            .collect()
    } else {
        args.tables
    };

    let plan = migration::plan(&source_schema, &target_schema, &tables);

    if plan.is_empty() {
        println!("Target already matches source for the selected tables; no migration needed.");
        return Ok(false);
    }

    for step in &plan.steps {
        println!("-- [{:?}] {} ({})", step.severity, step.description, step.table_name);
        for stmt in &step.up_sql {
            println!("{}", stmt);
        }
        if let Some(down) = &step.down_sql {
            println!("-- rollback:");
            for stmt in down {
                println!("-- {}", stmt);
            }
        } else {
            println!("-- rollback: not invertible, back up before applying");
        }
        println!();
    }

    if plan.has_dangerous_steps() {
        println!("WARNING: plan contains Dangerous steps. Review carefully before applying by hand.");
    }

    Ok(plan.has_dangerous_steps())
}
