// ABOUTME: Schema Inspector (C2) - bulk introspection of information_schema / pg_catalog
// ABOUTME: Full-database inspection runs a bounded, small number of catalog queries regardless of table count

use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::HashMap;
use tokio_postgres::Client;

use super::types::{
    ConstraintInfo, ConstraintKind, DatabaseSchema, DetailedColumn, DetailedTableSchema, EnumType,
    ForeignKey, IndexInfo, WraparoundCheck,
};

const EXCLUDED_PREFIXES: &[&str] = &["pg_", "_prisma_", "drizzle_"];

fn is_excluded(table_name: &str) -> bool {
    EXCLUDED_PREFIXES.iter().any(|p| table_name.starts_with(p))
}

/// Produce a full `DatabaseSchema` snapshot. Runs a fixed, small number of
/// bulk catalog queries (one per concern below) and assembles them in
/// memory by grouping rows under `table_name`, so the query count does not
/// grow with the number of tables.
pub async fn inspect(client: &Client, schema: &str) -> Result<DatabaseSchema> {
    let table_names = list_tables(client, schema).await?;

    let mut columns_by_table = bulk_columns(client, schema).await?;
    let pks_by_table = bulk_primary_keys(client, schema).await?;
    let fks_by_table = bulk_foreign_keys(client, schema).await?;
    let constraints_by_table = bulk_constraints(client, schema).await?;
    let indexes_by_table = bulk_indexes(client, schema).await?;
    let stats_by_table = bulk_table_stats(client, schema).await?;
    let triggers_by_table = bulk_trigger_tables(client, schema).await?;
    let enums = bulk_enums(client, schema).await?;

    let mut tables = Vec::with_capacity(table_names.len());
    for name in table_names {
        let mut columns = columns_by_table.remove(&name).unwrap_or_default();
        columns.sort_by_key(|c| c.ordinal_position);

        let pk = pks_by_table.get(&name).cloned();
        if let Some(pk_cols) = &pk {
            for col in &mut columns {
                col.is_primary_key = pk_cols.contains(&col.name);
            }
        }

        let (row_count, estimated_size) =
            stats_by_table.get(&name).copied().unwrap_or((0, 0));

        tables.push(DetailedTableSchema {
            schema: schema.to_string(),
            table_name: name.clone(),
            columns,
            primary_key: pk,
            foreign_keys: fks_by_table.get(&name).cloned().unwrap_or_default(),
            constraints: constraints_by_table.get(&name).cloned().unwrap_or_default(),
            indexes: indexes_by_table.get(&name).cloned().unwrap_or_default(),
            row_count,
            estimated_size_bytes: estimated_size,
            has_triggers: triggers_by_table.contains(&name),
        });
    }

    let version = server_version(client).await?;

    Ok(DatabaseSchema {
        tables,
        enums,
        version,
        inspected_at: Utc::now(),
    })
}

/// Introspect a single table, for the single-table path the full `inspect`
/// bulk pass does not serve well (e.g. interactive table pickers).
pub async fn inspect_table(
    client: &Client,
    schema: &str,
    table_name: &str,
) -> Result<Option<DetailedTableSchema>> {
    let full = inspect(client, schema).await?;
    Ok(full.tables.into_iter().find(|t| t.table_name == table_name))
}

async fn list_tables(client: &Client, schema: &str) -> Result<Vec<String>> {
    let rows = client
        .query(
            "SELECT tablename FROM pg_tables WHERE schemaname = $1 ORDER BY tablename",
            &[&schema],
        )
        .await
        .context("failed to list tables")?;

    Ok(rows
        .into_iter()
        .map(|r| r.get::<_, String>(0))
        .filter(|name| !is_excluded(name))
        .collect())
}

async fn bulk_columns(
    client: &Client,
    schema: &str,
) -> Result<HashMap<String, Vec<DetailedColumn>>> {
    let rows = client
        .query(
            "SELECT table_name, column_name, data_type, udt_name, is_nullable, \
             column_default, character_maximum_length, numeric_precision, ordinal_position, \
             (is_generated <> 'NEVER' OR identity_generation IS NOT NULL) AS is_generated \
             FROM information_schema.columns \
             WHERE table_schema = $1 \
             ORDER BY table_name, ordinal_position",
            &[&schema],
        )
        .await
        .context("failed to bulk-fetch columns")?;

    let mut map: HashMap<String, Vec<DetailedColumn>> = HashMap::new();
    for row in rows {
        let table_name: String = row.get(0);
        let column = DetailedColumn {
            name: row.get(1),
            data_type: row.get(2),
            udt_name: row.get(3),
            is_nullable: row.get::<_, String>(4) == "YES",
            default_value: row.get(5),
            is_primary_key: false,
            is_generated: row.get(9),
            max_length: row.get(6),
            numeric_precision: row.get(7),
            ordinal_position: row.get(8),
        };
        map.entry(table_name).or_default().push(column);
    }
    Ok(map)
}

async fn bulk_primary_keys(client: &Client, schema: &str) -> Result<HashMap<String, Vec<String>>> {
    let rows = client
        .query(
            "SELECT tc.table_name, kcu.column_name \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
             WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_schema = $1 \
             ORDER BY tc.table_name, kcu.ordinal_position",
            &[&schema],
        )
        .await
        .context("failed to bulk-fetch primary keys")?;

    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    for row in rows {
        let table_name: String = row.get(0);
        let column: String = row.get(1);
        map.entry(table_name).or_default().push(column);
    }
    Ok(map)
}

async fn bulk_foreign_keys(
    client: &Client,
    schema: &str,
) -> Result<HashMap<String, Vec<ForeignKey>>> {
    let rows = client
        .query(
            "SELECT tc.table_name, tc.constraint_name, kcu.column_name, \
                    ccu.table_name AS referenced_table, ccu.column_name AS referenced_column \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
             JOIN information_schema.constraint_column_usage ccu \
               ON tc.constraint_name = ccu.constraint_name AND tc.table_schema = ccu.table_schema \
             WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_schema = $1",
            &[&schema],
        )
        .await
        .context("failed to bulk-fetch foreign keys")?;

    let mut map: HashMap<String, Vec<ForeignKey>> = HashMap::new();
    for row in rows {
        let table_name: String = row.get(0);
        map.entry(table_name).or_default().push(ForeignKey {
            constraint_name: row.get(1),
            column: row.get(2),
            referenced_table: row.get(3),
            referenced_column: row.get(4),
        });
    }
    Ok(map)
}

async fn bulk_constraints(
    client: &Client,
    schema: &str,
) -> Result<HashMap<String, Vec<ConstraintInfo>>> {
    let rows = client
        .query(
            "SELECT conrelid::regclass::text, conname, contype, pg_get_constraintdef(oid) \
             FROM pg_constraint \
             WHERE connamespace = $1::regnamespace AND contype IN ('u', 'c', 'p')",
            &[&schema],
        )
        .await
        .context("failed to bulk-fetch constraints")?;

    let mut map: HashMap<String, Vec<ConstraintInfo>> = HashMap::new();
    for row in rows {
        let qualified_table: String = row.get(0);
        let table_name = qualified_table
            .rsplit('.')
            .next()
            .unwrap_or(&qualified_table)
            .trim_matches('"')
            .to_string();
        let contype: String = row.get(2);
        let kind = match contype.as_str() {
            "u" => ConstraintKind::Unique,
            "c" => ConstraintKind::Check,
            _ => ConstraintKind::PrimaryKey,
        };
        map.entry(table_name).or_default().push(ConstraintInfo {
            name: row.get(1),
            kind,
            definition: row.get(3),
        });
    }
    Ok(map)
}

async fn bulk_indexes(client: &Client, schema: &str) -> Result<HashMap<String, Vec<IndexInfo>>> {
    let rows = client
        .query(
            "SELECT tablename, indexname, indexdef, indexdef ILIKE '%UNIQUE%' \
             FROM pg_indexes WHERE schemaname = $1",
            &[&schema],
        )
        .await
        .context("failed to bulk-fetch indexes")?;

    let mut map: HashMap<String, Vec<IndexInfo>> = HashMap::new();
    for row in rows {
        let table_name: String = row.get(0);
        map.entry(table_name).or_default().push(IndexInfo {
            name: row.get(1),
            definition: row.get(2),
            is_unique: row.get(3),
        });
    }
    Ok(map)
}

/// Row-count estimate (`pg_class.reltuples`) and on-disk size, never
/// `COUNT(*)` which would scan every table.
async fn bulk_table_stats(
    client: &Client,
    schema: &str,
) -> Result<HashMap<String, (i64, i64)>> {
    let rows = client
        .query(
            "SELECT c.relname, c.reltuples::bigint, pg_total_relation_size(c.oid) \
             FROM pg_class c \
             JOIN pg_namespace n ON n.oid = c.relnamespace \
             WHERE n.nspname = $1 AND c.relkind = 'r'",
            &[&schema],
        )
        .await
        .context("failed to bulk-fetch table stats")?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let name: String = row.get(0);
            (name, (row.get(1), row.get(2)))
        })
        .collect())
}

async fn bulk_trigger_tables(
    client: &Client,
    schema: &str,
) -> Result<std::collections::HashSet<String>> {
    let rows = client
        .query(
            "SELECT DISTINCT event_object_table FROM information_schema.triggers \
             WHERE trigger_schema = $1",
            &[&schema],
        )
        .await
        .context("failed to bulk-fetch trigger tables")?;

    Ok(rows.into_iter().map(|r| r.get(0)).collect())
}

async fn bulk_enums(client: &Client, schema: &str) -> Result<Vec<EnumType>> {
    let rows = client
        .query(
            "SELECT t.typname, n.nspname, e.enumlabel \
             FROM pg_type t \
             JOIN pg_enum e ON t.oid = e.enumtypid \
             JOIN pg_namespace n ON n.oid = t.typnamespace \
             WHERE n.nspname = $1 \
             ORDER BY t.typname, e.enumsortorder",
            &[&schema],
        )
        .await
        .context("failed to bulk-fetch enums")?;

    let mut map: HashMap<String, EnumType> = HashMap::new();
    for row in rows {
        let name: String = row.get(0);
        let ns: String = row.get(1);
        let label: String = row.get(2);
        map.entry(name.clone())
            .or_insert_with(|| EnumType {
                name,
                schema: ns,
                values: Vec::new(),
            })
            .values
            .push(label);
    }
    Ok(map.into_values().collect())
}

async fn server_version(client: &Client) -> Result<String> {
    let row = client
        .query_one("SHOW server_version", &[])
        .await
        .context("failed to read server_version")?;
    Ok(row.get(0))
}

/// Quick per-table check of the `id uuid` / `updated_at timestamp[tz]`
/// sync requirements without a full bulk inspection.
pub async fn validate_sync_requirements(
    client: &Client,
    schema: &str,
    table_name: &str,
) -> Result<bool> {
    match inspect_table(client, schema, table_name).await? {
        Some(table) => Ok(table.is_syncable()),
        None => Ok(false),
    }
}

/// Compute the `xmin` wraparound health signal for a table:
/// `age(relfrozenxid)` against a threshold. Advisory only; never used as
/// the sync watermark.
pub async fn check_wraparound(
    client: &Client,
    schema: &str,
    table_name: &str,
) -> Result<WraparoundCheck> {
    let row = client
        .query_one(
            "SELECT age(c.relfrozenxid) FROM pg_class c \
             JOIN pg_namespace n ON n.oid = c.relnamespace \
             WHERE n.nspname = $1 AND c.relname = $2",
            &[&schema, &table_name],
        )
        .await
        .context("failed to compute xmin wraparound age")?;

    Ok(WraparoundCheck {
        table: format!("{}.{}", schema, table_name),
        age: row.get::<_, i32>(0) as i64,
        threshold: WraparoundCheck::DEFAULT_THRESHOLD,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excludes_internal_prefixes() {
        assert!(is_excluded("pg_stat_statements"));
        assert!(is_excluded("_prisma_migrations"));
        assert!(is_excluded("drizzle_migrations"));
        assert!(!is_excluded("users"));
    }
}
