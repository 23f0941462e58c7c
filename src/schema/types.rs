// ABOUTME: Immutable value types produced by the schema inspector
// ABOUTME: Any "mutation" of a schema produces a new snapshot rather than editing in place

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single column as introspected from `information_schema` / `pg_catalog`.
/// Immutable snapshot of one column's metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedColumn {
    pub name: String,
    pub data_type: String,
    pub udt_name: String,
    pub is_nullable: bool,
    pub default_value: Option<String>,
    pub is_primary_key: bool,
    pub is_generated: bool,
    pub max_length: Option<i32>,
    pub numeric_precision: Option<i32>,
    pub ordinal_position: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub constraint_name: String,
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstraintKind {
    Unique,
    Check,
    PrimaryKey,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintInfo {
    pub name: String,
    pub kind: ConstraintKind,
    pub definition: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub definition: String,
    pub is_unique: bool,
}

/// A fully introspected table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedTableSchema {
    pub schema: String,
    pub table_name: String,
    pub columns: Vec<DetailedColumn>,
    pub primary_key: Option<Vec<String>>,
    pub foreign_keys: Vec<ForeignKey>,
    pub constraints: Vec<ConstraintInfo>,
    pub indexes: Vec<IndexInfo>,
    /// Estimated via `pg_class.reltuples`, never `COUNT(*)`.
    pub row_count: i64,
    pub estimated_size_bytes: i64,
    pub has_triggers: bool,
}

impl DetailedTableSchema {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.table_name)
    }

    pub fn column(&self, name: &str) -> Option<&DetailedColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// A table is "syncable" iff it has an `id` column of UDT `uuid` and an
    /// `updated_at` column of UDT `timestamp` or `timestamptz`.
    pub fn is_syncable(&self) -> bool {
        let has_id = self
            .column("id")
            .map(|c| c.udt_name == "uuid")
            .unwrap_or(false);
        let has_updated_at = self
            .column("updated_at")
            .map(|c| c.udt_name == "timestamp" || c.udt_name == "timestamptz")
            .unwrap_or(false);
        has_id && has_updated_at
    }

    /// Columns eligible for an INSERT value list: excludes generated /
    /// identity columns, whose values PostgreSQL computes itself.
    pub fn insertable_columns(&self) -> Vec<&DetailedColumn> {
        self.columns.iter().filter(|c| !c.is_generated).collect()
    }
}

/// An enum type defined in the database, carried along so the validator
/// can flag enum-backed columns whose allowed values diverge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumType {
    pub name: String,
    pub schema: String,
    pub values: Vec<String>,
}

/// A full database snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSchema {
    pub tables: Vec<DetailedTableSchema>,
    pub enums: Vec<EnumType>,
    pub version: String,
    pub inspected_at: DateTime<Utc>,
}

impl DatabaseSchema {
    pub fn table(&self, name: &str) -> Option<&DetailedTableSchema> {
        self.tables.iter().find(|t| t.table_name == name)
    }

    /// Tables satisfying [`DetailedTableSchema::is_syncable`] — the single
    /// precondition for participating in sync.
    pub fn syncable_tables(&self) -> Vec<&DetailedTableSchema> {
        self.tables.iter().filter(|t| t.is_syncable()).collect()
    }
}

/// Advisory health signal from `xmin` transaction-id wraparound exposure
/// Never used as the sync watermark — only surfaced as a
/// pre-flight / mid-job warning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WraparoundCheck {
    pub table: String,
    pub age: i64,
    pub threshold: i64,
}

impl WraparoundCheck {
    /// `age(relfrozenxid)` past this threshold is worth a CRITICAL alert;
    /// PostgreSQL itself begins forcing autovacuum around 200M and refuses
    /// writes near 2^31.
    pub const DEFAULT_THRESHOLD: i64 = 150_000_000;

    pub fn is_concerning(&self) -> bool {
        self.age >= self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, udt: &str) -> DetailedColumn {
        DetailedColumn {
            name: name.to_string(),
            data_type: udt.to_string(),
            udt_name: udt.to_string(),
            is_nullable: false,
            default_value: None,
            is_primary_key: name == "id",
            is_generated: false,
            max_length: None,
            numeric_precision: None,
            ordinal_position: 0,
        }
    }

    fn table_with(columns: Vec<DetailedColumn>) -> DetailedTableSchema {
        DetailedTableSchema {
            schema: "public".to_string(),
            table_name: "users".to_string(),
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

    #[test]
    fn syncable_requires_uuid_id_and_timestamp_updated_at() {
        let table = table_with(vec![col("id", "uuid"), col("updated_at", "timestamptz")]);
        assert!(table.is_syncable());
    }

    #[test]
    fn not_syncable_without_uuid_id() {
        let table = table_with(vec![col("id", "int4"), col("updated_at", "timestamptz")]);
        assert!(!table.is_syncable());
    }

    #[test]
    fn not_syncable_without_updated_at() {
        let table = table_with(vec![col("id", "uuid")]);
        assert!(!table.is_syncable());
    }

    #[test]
    fn insertable_columns_excludes_generated() {
        let mut id = col("id", "uuid");
        id.is_generated = false;
        let mut generated = col("full_name", "text");
        generated.is_generated = true;
        let table = table_with(vec![id, generated]);
        assert_eq!(table.insertable_columns().len(), 1);
    }

    #[test]
    fn wraparound_check_flags_age_past_threshold() {
        let check = WraparoundCheck {
            table: "public.users".to_string(),
            age: 200_000_000,
            threshold: WraparoundCheck::DEFAULT_THRESHOLD,
        };
        assert!(check.is_concerning());
    }
}
