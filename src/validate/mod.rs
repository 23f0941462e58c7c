// ABOUTME: Schema Validator (C3) - compares a selected table set across two schemas
// ABOUTME: Submodules: issues (ValidationIssue/severity), graph (topological sort, cycle detection)

pub mod graph;
pub mod issues;

pub use graph::{build_graph, find_cycle_members, topological_order, DependencyGraph};
pub use issues::{Severity, SchemaValidationResult, ValidationIssue};

use crate::schema::{are_types_compatible, can_safely_insert, DatabaseSchema, DetailedTableSchema};

/// Compare `source` and `target` across `selected_tables`, emitting a
/// `ValidationIssue` for every divergence.
pub fn validate(
    source: &DatabaseSchema,
    target: &DatabaseSchema,
    selected_tables: &[String],
) -> SchemaValidationResult {
    let mut result = SchemaValidationResult::default();

    for table_name in selected_tables {
        let source_table = source.table(table_name);
        let target_table = target.table(table_name);

        let (source_table, target_table) = match (source_table, target_table) {
            (Some(s), Some(t)) => (s, t),
            (None, _) | (_, None) => {
                result.push(ValidationIssue::new(
                    Severity::Critical,
                    "missing_table",
                    table_name,
                    format!(
                        "table '{}' is missing on {}",
                        table_name,
                        if source_table.is_none() { "source" } else { "target" }
                    ),
                ));
                continue;
            }
        };

        check_sync_requirement_columns(source_table, &mut result);
        check_column_divergence(source_table, target_table, &mut result);
        check_target_only_requirements(target_table, source_table, &mut result);
        check_foreign_keys(target_table, source_table, &mut result);
        check_unique_and_check_constraints(target_table, source_table, &mut result);
        check_index_differences(target_table, source_table, &mut result);
    }

    check_enum_differences(source, target, &mut result);

    result
}

/// ENUM types used by either side: missing on target is HIGH (any
/// source-typed column using it would fail to sync), missing values are
/// MEDIUM (only specific values break), extra target-only values are INFO.
fn check_enum_differences(source: &DatabaseSchema, target: &DatabaseSchema, result: &mut SchemaValidationResult) {
    for source_enum in &source.enums {
        let Some(target_enum) = target
            .enums
            .iter()
            .find(|e| e.name == source_enum.name && e.schema == source_enum.schema)
        else {
            result.push(ValidationIssue::new(
                Severity::High,
                "missing_enum",
                &source_enum.name,
                format!("enum type '{}' is missing on target", source_enum.name),
            ));
            continue;
        };

        let missing: Vec<&String> = source_enum
            .values
            .iter()
            .filter(|v| !target_enum.values.contains(v))
            .collect();
        if !missing.is_empty() {
            result.push(ValidationIssue::new(
                Severity::Medium,
                "missing_enum_values",
                &source_enum.name,
                format!(
                    "enum '{}' is missing value(s) on target: {}",
                    source_enum.name,
                    missing.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
                ),
            ));
        }

        let extra: Vec<&String> = target_enum
            .values
            .iter()
            .filter(|v| !source_enum.values.contains(v))
            .collect();
        if !extra.is_empty() {
            result.push(ValidationIssue::new(
                Severity::Info,
                "extra_enum_values",
                &source_enum.name,
                format!(
                    "enum '{}' has target-only value(s): {}",
                    source_enum.name,
                    extra.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
                ),
            ));
        }
    }
}

fn check_sync_requirement_columns(table: &DetailedTableSchema, result: &mut SchemaValidationResult) {
    let id_ok = table
        .column("id")
        .map(|c| c.udt_name == "uuid")
        .unwrap_or(false);
    let updated_at_ok = table
        .column("updated_at")
        .map(|c| c.udt_name == "timestamp" || c.udt_name == "timestamptz")
        .unwrap_or(false);

    if !id_ok {
        result.push(
            ValidationIssue::new(
                Severity::Critical,
                "missing_sync_requirement",
                &table.table_name,
                "required 'id uuid' column missing or wrong type",
            )
            .with_column("id"),
        );
    }
    if !updated_at_ok {
        result.push(
            ValidationIssue::new(
                Severity::Critical,
                "missing_sync_requirement",
                &table.table_name,
                "required 'updated_at timestamp[tz]' column missing or wrong type",
            )
            .with_column("updated_at"),
        );
    }
}

fn check_column_divergence(
    source_table: &DetailedTableSchema,
    target_table: &DetailedTableSchema,
    result: &mut SchemaValidationResult,
) {
    for source_col in &source_table.columns {
        match target_table.column(&source_col.name) {
            None => {
                let severity = if !source_col.is_nullable && source_col.default_value.is_none() {
                    Severity::Critical
                } else {
                    Severity::Low
                };
                result.push(
                    ValidationIssue::new(
                        severity,
                        "missing_column",
                        &source_table.table_name,
                        format!("source column '{}' absent in target", source_col.name),
                    )
                    .with_column(&source_col.name),
                );
            }
            Some(target_col) => {
                if !are_types_compatible(&source_col.udt_name, &target_col.udt_name) {
                    result.push(
                        ValidationIssue::new(
                            Severity::High,
                            "incompatible_type",
                            &source_table.table_name,
                            format!(
                                "column '{}' type mismatch: source {} vs target {}",
                                source_col.name, source_col.udt_name, target_col.udt_name
                            ),
                        )
                        .with_column(&source_col.name),
                    );
                } else if !can_safely_insert(source_col, target_col) {
                    result.push(
                        ValidationIssue::new(
                            Severity::Medium,
                            "tighter_target_constraint",
                            &source_table.table_name,
                            format!(
                                "column '{}' is compatible but target is more restrictive",
                                source_col.name
                            ),
                        )
                        .with_column(&source_col.name),
                    );
                }
            }
        }
    }
}

fn check_target_only_requirements(
    target_table: &DetailedTableSchema,
    source_table: &DetailedTableSchema,
    result: &mut SchemaValidationResult,
) {
    for target_col in &target_table.columns {
        if source_table.column(&target_col.name).is_none()
            && !target_col.is_nullable
            && target_col.default_value.is_none()
            && !target_col.is_generated
        {
            result.push(
                ValidationIssue::new(
                    Severity::High,
                    "target_not_null_without_default",
                    &target_table.table_name,
                    format!(
                        "target column '{}' is NOT NULL without a default and absent in source",
                        target_col.name
                    ),
                )
                .with_column(&target_col.name),
            );
        }
    }
}

fn check_foreign_keys(
    target_table: &DetailedTableSchema,
    source_table: &DetailedTableSchema,
    result: &mut SchemaValidationResult,
) {
    for fk in &target_table.foreign_keys {
        let present_in_source = source_table
            .foreign_keys
            .iter()
            .any(|f| f.column == fk.column && f.referenced_table == fk.referenced_table);
        if !present_in_source {
            result.push(
                ValidationIssue::new(
                    Severity::High,
                    "target_only_foreign_key",
                    &target_table.table_name,
                    format!(
                        "target foreign key '{}' on column '{}' absent in source; may violate on insert",
                        fk.constraint_name, fk.column
                    ),
                )
                .with_column(&fk.column),
            );
        }
    }
}

fn check_unique_and_check_constraints(
    target_table: &DetailedTableSchema,
    source_table: &DetailedTableSchema,
    result: &mut SchemaValidationResult,
) {
    use crate::schema::ConstraintKind;

    for constraint in &target_table.constraints {
        let present_in_source = source_table
            .constraints
            .iter()
            .any(|c| c.definition == constraint.definition);
        if present_in_source {
            continue;
        }
        match constraint.kind {
            ConstraintKind::Unique => {
                result.push(ValidationIssue::new(
                    Severity::Medium,
                    "target_only_unique_constraint",
                    &target_table.table_name,
                    format!(
                        "target UNIQUE constraint '{}' absent in source",
                        constraint.name
                    ),
                ));
            }
            ConstraintKind::Check => {
                result.push(ValidationIssue::new(
                    Severity::Info,
                    "target_only_check_constraint",
                    &target_table.table_name,
                    format!(
                        "target CHECK constraint '{}' absent in source",
                        constraint.name
                    ),
                ));
            }
            ConstraintKind::PrimaryKey => {}
        }
    }
}

fn check_index_differences(
    target_table: &DetailedTableSchema,
    source_table: &DetailedTableSchema,
    result: &mut SchemaValidationResult,
) {
    for index in &target_table.indexes {
        let present_in_source = source_table.indexes.iter().any(|i| i.definition == index.definition);
        if !present_in_source {
            result.push(ValidationIssue::new(
                Severity::Info,
                "index_difference",
                &target_table.table_name,
                format!("target index '{}' has no source counterpart", index.name),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ConstraintInfo, ConstraintKind, DetailedColumn, EnumType};
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
    fn missing_table_is_critical() {
        let source = schema_with(vec![table(
            "users",
            vec![col("id", "uuid", false), col("updated_at", "timestamptz", false)],
        )]);
        let target = schema_with(vec![]);
        let result = validate(&source, &target, &["users".to_string()]);
        assert!(result.has_blocking_issues());
    }

    #[test]
    fn matching_tables_produce_no_issues() {
        let cols = vec![col("id", "uuid", false), col("updated_at", "timestamptz", false)];
        let source = schema_with(vec![table("users", cols.clone())]);
        let target = schema_with(vec![table("users", cols)]);
        let result = validate(&source, &target, &["users".to_string()]);
        assert!(result.issues.is_empty());
    }

    #[test]
    fn incompatible_column_type_is_high() {
        let source_cols = vec![
            col("id", "uuid", false),
            col("updated_at", "timestamptz", false),
            col("age", "int4", true),
        ];
        let target_cols = vec![
            col("id", "uuid", false),
            col("updated_at", "timestamptz", false),
            col("age", "text", true),
        ];
        let source = schema_with(vec![table("users", source_cols)]);
        let target = schema_with(vec![table("users", target_cols)]);
        let result = validate(&source, &target, &["users".to_string()]);
        assert!(result
            .by_severity(Severity::High)
            .iter()
            .any(|i| i.category == "incompatible_type"));
    }

    #[test]
    fn target_not_null_without_default_and_missing_in_source_is_high() {
        let source_cols = vec![col("id", "uuid", false), col("updated_at", "timestamptz", false)];
        let mut target_cols = source_cols.clone();
        target_cols.push(col("required_field", "text", false));
        let source = schema_with(vec![table("users", source_cols)]);
        let target = schema_with(vec![table("users", target_cols)]);
        let result = validate(&source, &target, &["users".to_string()]);
        assert!(result
            .by_severity(Severity::High)
            .iter()
            .any(|i| i.category == "target_not_null_without_default"));
    }

    #[test]
    fn target_only_unique_constraint_is_medium() {
        let cols = vec![col("id", "uuid", false), col("updated_at", "timestamptz", false)];
        let source = schema_with(vec![table("users", cols.clone())]);
        let mut target_table = table("users", cols);
        target_table.constraints.push(ConstraintInfo {
            name: "users_email_key".to_string(),
            kind: ConstraintKind::Unique,
            definition: "UNIQUE (email)".to_string(),
        });
        let target = schema_with(vec![target_table]);
        let result = validate(&source, &target, &["users".to_string()]);
        assert!(result
            .by_severity(Severity::Medium)
            .iter()
            .any(|i| i.category == "target_only_unique_constraint"));
    }

    fn schema_with_enums(tables: Vec<DetailedTableSchema>, enums: Vec<EnumType>) -> DatabaseSchema {
        let mut schema = schema_with(tables);
        schema.enums = enums;
        schema
    }

    fn enum_type(name: &str, values: &[&str]) -> EnumType {
        EnumType {
            name: name.to_string(),
            schema: "public".to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    #[test]
    fn enum_missing_on_target_is_high() {
        let cols = vec![col("id", "uuid", false), col("updated_at", "timestamptz", false)];
        let source = schema_with_enums(vec![table("users", cols.clone())], vec![enum_type("status", &["active", "inactive"])]);
        let target = schema_with(vec![table("users", cols)]);
        let result = validate(&source, &target, &["users".to_string()]);
        assert!(result.by_severity(Severity::High).iter().any(|i| i.category == "missing_enum"));
    }

    #[test]
    fn enum_missing_value_on_target_is_medium() {
        let cols = vec![col("id", "uuid", false), col("updated_at", "timestamptz", false)];
        let source = schema_with_enums(
            vec![table("users", cols.clone())],
            vec![enum_type("status", &["active", "inactive", "banned"])],
        );
        let target = schema_with_enums(vec![table("users", cols)], vec![enum_type("status", &["active", "inactive"])]);
        let result = validate(&source, &target, &["users".to_string()]);
        assert!(result
            .by_severity(Severity::Medium)
            .iter()
            .any(|i| i.category == "missing_enum_values"));
    }

    #[test]
    fn enum_extra_value_on_target_is_info() {
        let cols = vec![col("id", "uuid", false), col("updated_at", "timestamptz", false)];
        let source = schema_with_enums(vec![table("users", cols.clone())], vec![enum_type("status", &["active", "inactive"])]);
        let target = schema_with_enums(
            vec![table("users", cols)],
            vec![enum_type("status", &["active", "inactive", "pending"])],
        );
        let result = validate(&source, &target, &["users".to_string()]);
        assert!(result
            .by_severity(Severity::Info)
            .iter()
            .any(|i| i.category == "extra_enum_values"));
    }
}
