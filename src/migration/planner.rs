// ABOUTME: Migration Planner (C4) - produces ordered idempotent DDL aligning target to source
// ABOUTME: Executing the plan is out of scope; this only ever plans, never runs DDL

use crate::schema::{are_types_compatible, ConstraintKind, DatabaseSchema, DetailedColumn, DetailedTableSchema};
use crate::utils::quote_ident;

use super::types::{MigrationPlan, MigrationStep, Severity};

/// Build the full alignment plan for `selected_tables`: create missing
/// tables, add missing columns (multi-step when NOT NULL without a
/// default), align incompatible column types, create missing indexes,
/// add missing CHECK constraints.
pub fn plan(source: &DatabaseSchema, target: &DatabaseSchema, selected_tables: &[String]) -> MigrationPlan {
    let mut plan = MigrationPlan::default();

    for table_name in selected_tables {
        let Some(source_table) = source.table(table_name) else {
            continue;
        };

        match target.table(table_name) {
            None => plan.push(create_table_step(source_table)),
            Some(target_table) => {
                for column in &source_table.columns {
                    if target_table.column(&column.name).is_none() {
                        for step in add_column_steps(source_table, column) {
                            plan.push(step);
                        }
                    } else if let Some(target_col) = target_table.column(&column.name) {
                        if !are_types_compatible(&column.udt_name, &target_col.udt_name) {
                            plan.push(alter_column_type_step(source_table, column, target_col));
                        }
                    }
                }

                for index in &source_table.indexes {
                    let exists = target_table.indexes.iter().any(|i| i.name == index.name);
                    if !exists {
                        plan.push(create_index_step(source_table, index));
                    }
                }

                for constraint in &source_table.constraints {
                    if constraint.kind != ConstraintKind::Check {
                        continue;
                    }
                    let exists = target_table
                        .constraints
                        .iter()
                        .any(|c| c.definition == constraint.definition);
                    if !exists {
                        plan.push(add_check_constraint_step(source_table, constraint));
                    }
                }
            }
        }
    }

    plan
}

fn column_sql_type(column: &DetailedColumn) -> String {
    match (column.udt_name.as_str(), column.max_length, column.numeric_precision) {
        ("varchar" | "bpchar", Some(len), _) => format!("{}({})", column.udt_name, len),
        ("numeric", _, Some(precision)) => format!("numeric({})", precision),
        _ => column.udt_name.clone(),
    }
}

fn create_table_step(table: &DetailedTableSchema) -> MigrationStep {
    let columns_sql: Vec<String> = table
        .columns
        .iter()
        .map(|c| {
            let null_clause = if c.is_nullable { "" } else { " NOT NULL" };
            format!("{} {}{}", quote_ident(&c.name), column_sql_type(c), null_clause)
        })
        .collect();

    let pk_clause = table
        .primary_key
        .as_ref()
        .filter(|pk| !pk.is_empty())
        .map(|pk| {
            format!(
                ", PRIMARY KEY ({})",
                pk.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ")
            )
        })
        .unwrap_or_default();

    let up = format!(
        "CREATE TABLE IF NOT EXISTS {} ({}{});",
        quote_ident(&table.table_name),
        columns_sql.join(", "),
        pk_clause
    );

    MigrationStep {
        id: format!("create_table:{}", table.table_name),
        table_name: table.table_name.clone(),
        description: format!("create missing table {}", table.table_name),
        severity: Severity::Safe,
        up_sql: vec![up],
        down_sql: Some(vec![format!("DROP TABLE IF EXISTS {};", quote_ident(&table.table_name))]),
    }
}

/// Multi-step handling for NOT NULL without default: add the
/// column nullable, backfill from the default if one exists, then
/// tighten to NOT NULL in a separate statement.
fn add_column_steps(table: &DetailedTableSchema, column: &DetailedColumn) -> Vec<MigrationStep> {
    let table_ident = quote_ident(&table.table_name);
    let col_ident = quote_ident(&column.name);
    let sql_type = column_sql_type(column);

    let mut steps = Vec::new();

    steps.push(MigrationStep {
        id: format!("add_column:{}.{}", table.table_name, column.name),
        table_name: table.table_name.clone(),
        description: format!("add column {} to {}", column.name, table.table_name),
        severity: Severity::Safe,
        up_sql: vec![format!(
            "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {} {};",
            table_ident, col_ident, sql_type
        )],
        down_sql: Some(vec![format!(
            "ALTER TABLE {} DROP COLUMN IF EXISTS {};",
            table_ident, col_ident
        )]),
    });

    if !column.is_nullable {
        if let Some(default) = &column.default_value {
            steps.push(MigrationStep {
                id: format!("backfill_column:{}.{}", table.table_name, column.name),
                table_name: table.table_name.clone(),
                description: format!("backfill {} with its default before tightening to NOT NULL", column.name),
                severity: Severity::Caution,
                up_sql: vec![format!(
                    "UPDATE {} SET {} = {} WHERE {} IS NULL;",
                    table_ident, col_ident, default, col_ident
                )],
                down_sql: None,
            });
        }

        steps.push(MigrationStep {
            id: format!("set_not_null:{}.{}", table.table_name, column.name),
            table_name: table.table_name.clone(),
            description: format!("tighten {} to NOT NULL", column.name),
            severity: Severity::Caution,
            up_sql: vec![format!(
                "DO $$ BEGIN \
                   IF NOT EXISTS (SELECT 1 FROM information_schema.columns \
                                  WHERE table_name = {} AND column_name = {} AND is_nullable = 'NO') THEN \
                     ALTER TABLE {} ALTER COLUMN {} SET NOT NULL; \
                   END IF; \
                 END $$;",
                crate::utils::quote_literal(&table.table_name),
                crate::utils::quote_literal(&column.name),
                table_ident,
                col_ident
            )],
            down_sql: Some(vec![format!(
                "ALTER TABLE {} ALTER COLUMN {} DROP NOT NULL;",
                table_ident, col_ident
            )]),
        });
    }

    steps
}

/// Type changes run inside their own sub-transaction so a failed `USING`
/// cast doesn't abort the whole plan; this only plans the statement, it
/// does not wrap execution (execution is out of scope).
fn alter_column_type_step(
    table: &DetailedTableSchema,
    source_column: &DetailedColumn,
    target_column: &DetailedColumn,
) -> MigrationStep {
    let table_ident = quote_ident(&table.table_name);
    let col_ident = quote_ident(&source_column.name);
    let new_type = column_sql_type(source_column);
    let old_type = column_sql_type(target_column);

    MigrationStep {
        id: format!("alter_column_type:{}.{}", table.table_name, source_column.name),
        table_name: table.table_name.clone(),
        description: format!(
            "align {}.{} type ({} -> {})",
            table.table_name, source_column.name, old_type, new_type
        ),
        severity: Severity::Dangerous,
        up_sql: vec![format!(
            "ALTER TABLE {} ALTER COLUMN {} TYPE {} USING {}::{};",
            table_ident, col_ident, new_type, col_ident, new_type
        )],
        down_sql: Some(vec![format!(
            "ALTER TABLE {} ALTER COLUMN {} TYPE {} USING {}::{};",
            table_ident, col_ident, old_type, col_ident, old_type
        )]),
    }
}

fn create_index_step(table: &DetailedTableSchema, index: &crate::schema::IndexInfo) -> MigrationStep {
    MigrationStep {
        id: format!("create_index:{}.{}", table.table_name, index.name),
        table_name: table.table_name.clone(),
        description: format!("create missing index {}", index.name),
        severity: Severity::Safe,
        up_sql: vec![with_if_not_exists(&index.definition, &index.name)],
        down_sql: Some(vec![format!("DROP INDEX IF EXISTS {};", quote_ident(&index.name))]),
    }
}

fn with_if_not_exists(definition: &str, _name: &str) -> String {
    if definition.to_uppercase().contains("IF NOT EXISTS") {
        format!("{};", definition)
    } else {
        definition.replacen("INDEX ", "INDEX IF NOT EXISTS ", 1) + ";"
    }
}

fn add_check_constraint_step(table: &DetailedTableSchema, constraint: &crate::schema::ConstraintInfo) -> MigrationStep {
    let table_ident = quote_ident(&table.table_name);
    MigrationStep {
        id: format!("add_check:{}.{}", table.table_name, constraint.name),
        table_name: table.table_name.clone(),
        description: format!("add missing CHECK constraint {}", constraint.name),
        severity: Severity::Caution,
        up_sql: vec![format!(
            "DO $$ BEGIN \
               IF NOT EXISTS (SELECT 1 FROM pg_constraint WHERE conname = {}) THEN \
                 ALTER TABLE {} ADD CONSTRAINT {} {}; \
               END IF; \
             END $$;",
            crate::utils::quote_literal(&constraint.name),
            table_ident,
            quote_ident(&constraint.name),
            constraint.definition
        )],
        down_sql: Some(vec![format!(
            "ALTER TABLE {} DROP CONSTRAINT IF EXISTS {};",
            table_ident,
            quote_ident(&constraint.name)
        )]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn col(name: &str, udt: &str, nullable: bool) -> DetailedColumn {
        DetailedColumn {
            name: name.to_string(),
            data_type: udt.to_string(),
            udt_name: udt.to_string(),
            is_nullable: nullable,
            default_value: None,
            is_primary_key: name == "id",
            is_generated: false,
            max_length: None,
            numeric_precision: None,
            ordinal_position: 0,
        }
    }

    fn table(name: &str, columns: Vec<DetailedColumn>) -> DetailedTableSchema {
        DetailedTableSchema {
            schema: "public".to_string(),
            table_name: name.to_string(),
            columns,
            primary_key: Some(vec!["id".to_string()]),
            foreign_keys: vec![],
            constraints: vec![],
            indexes: vec![],
            row_count: 0,
            estimated_size_bytes: 0,
            has_triggers: false,
        }
    }

    fn schema_with(tables: Vec<DetailedTableSchema>) -> DatabaseSchema {
        DatabaseSchema {
            tables,
            enums: vec![],
            version: "16.0".to_string(),
            inspected_at: Utc::now(),
        }
    }

    #[test]
    fn missing_table_produces_create_table_step() {
        let cols = vec![col("id", "uuid", false), col("updated_at", "timestamptz", false)];
        let source = schema_with(vec![table("users", cols)]);
        let target = schema_with(vec![]);
        let plan = plan(&source, &target, &["users".to_string()]);
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].severity, Severity::Safe);
        assert!(plan.steps[0].up_sql[0].contains("CREATE TABLE IF NOT EXISTS"));
    }

    #[test]
    fn missing_not_null_column_produces_multi_step_plan() {
        let source_cols = vec![
            col("id", "uuid", false),
            col("updated_at", "timestamptz", false),
            col("required_field", "text", false),
        ];
        let target_cols = vec![col("id", "uuid", false), col("updated_at", "timestamptz", false)];
        let source = schema_with(vec![table("users", source_cols)]);
        let target = schema_with(vec![table("users", target_cols)]);
        let plan = plan(&source, &target, &["users".to_string()]);
        assert_eq!(plan.steps.len(), 2); // add column + set not null (no default to backfill)
        assert!(plan.steps[0].up_sql[0].contains("ADD COLUMN IF NOT EXISTS"));
        assert!(plan.steps[1].up_sql[0].contains("SET NOT NULL"));
    }

    #[test]
    fn matching_schemas_produce_empty_plan() {
        let cols = vec![col("id", "uuid", false), col("updated_at", "timestamptz", false)];
        let source = schema_with(vec![table("users", cols.clone())]);
        let target = schema_with(vec![table("users", cols)]);
        let plan = plan(&source, &target, &["users".to_string()]);
        assert!(plan.is_empty());
    }
}
