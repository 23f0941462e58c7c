// ABOUTME: `validate` subcommand - pre-flight privilege checks plus schema validation (C2/C3)
// ABOUTME: Prints a severity histogram and exits non-zero when CRITICAL issues block the sync

use anyhow::{Context, Result};

use crate::postgres;
use crate::preflight;
use crate::schema;
use crate::validate::{self, Severity};

pub struct ValidateArgs {
    pub source_url: String,
    pub target_url: String,
    pub tables: Vec<String>,
    pub schema: String,
    pub skip_preflight: bool,
}

/// Runs privilege/connectivity pre-flight (unless skipped) followed by the
/// schema validator across `tables` (or every syncable table
/// on the source, if none were named). Returns `Ok(true)` when the job can
/// proceed (no CRITICAL issues).
pub async fn run_validate(args: ValidateArgs) -> Result<bool> {
    if !args.skip_preflight {
        let result = preflight::run_preflight_checks(&args.source_url, &args.target_url, None)
            .await
            .context("pre-flight checks failed to run")?;
        result.print();
        if !result.all_passed() {
            println!();
            println!("Pre-flight checks failed; schema validation skipped. Pass --skip-preflight to override.");
            return Ok(false);
        }
    }

    let source_client = postgres::connect_with_retry(&args.source_url)
        .await
        .context("failed to connect to source for schema inspection")?;
    let target_client = postgres::connect_with_retry(&args.target_url)
        .await
        .context("failed to connect to target for schema inspection")?;

    let source_schema = schema::inspect(&source_client, &args.schema)
        .await
        .context("failed to inspect source schema")?;
    let target_schema = schema::inspect(&target_client, &args.schema)
        .await
        .context("failed to inspect target schema")?;

    let selected: Vec<String> = if args.tables.is_empty() {
        source_schema
            .syncable_tables()
            .iter()
            .map(|t| t.table_name.clone())
            .collect()
    } else {
        args.tables
    };

    if selected.is_empty() {
        println!("No syncable tables found (need an `id uuid` + `updated_at timestamp[tz]` column pair).");
        return Ok(false);
    }

    let result = validate::validate(&source_schema, &target_schema, &selected);
    print_validation_result(&result);

    Ok(!result.has_blocking_issues())
}

fn print_validation_result(result: &validate::SchemaValidationResult) {
    println!();
    println!("Schema Validation");
    println!("{}", "=".repeat(61));
    for severity in [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ] {
        let issues = result.by_severity(severity);
        if issues.is_empty() {
            continue;
        }
        println!("\n{:?} ({})", severity, issues.len());
        for issue in issues {
            println!("  [{}] {}: {}", issue.category, issue.table_name, issue.message);
        }
    }
    println!();
    if result.has_blocking_issues() {
        println!("BLOCKED: CRITICAL issues must be resolved before sync can proceed.");
    } else if result.requires_confirmation() {
        println!("CAUTION: HIGH severity issues found; confirm before proceeding.");
    } else {
        println!("OK: no blocking issues found.");
    }
}
