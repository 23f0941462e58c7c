// ABOUTME: The engine's column value model - a small tagged union bridging source rows to
// ABOUTME: target binds, plus the serialization reductions and size estimate the executor needs

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use bytes::BytesMut;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use tokio_postgres::Row;
use uuid::Uuid;

use crate::schema::DetailedColumn;

/// One column's value, reduced from whatever PostgreSQL type it came from
/// down to a handful of shapes the executor can move between source and
/// target without knowing either side's exact type in advance.
///
/// Nulls pass through as `Null`; bigint columns are carried as `Str`
/// (decimal text) rather than risking i64 precision loss on the wire; byte
/// columns stay binary; anything JSON-ish collapses to `Json`. There is
/// deliberately no `Array` variant — source arrays are read out as `Json`
/// via the driver's JSON cast instead of being modeled as a native array
/// type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Str(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Rough in-memory/wire size in bytes, used to keep a single row under
    /// the 1 MiB bulk-path cutoff. Strings and JSON are costed as UTF-16
    /// code units doubled, a cheap stand-in for the actual wire encoding
    /// that's good enough for a batching threshold.
    pub fn estimate_size(&self) -> usize {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::I64(_) => 8,
            Value::F64(_) => 8,
            Value::Str(s) => s.encode_utf16().count() * 2,
            Value::Bytes(b) => b.len(),
            Value::Timestamp(_) => 8,
            Value::Json(j) => serde_json::to_string(j).map(|s| s.len() * 2).unwrap_or(0),
        }
    }
}

/// An ordered row: insertion order is preserved (column order as returned
/// by the driver) while still allowing lookup by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderedRow {
    columns: Vec<String>,
    values: BTreeMap<String, Value>,
}

impl OrderedRow {
    pub fn new() -> Self {
        OrderedRow::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, value: Value) {
        let column = column.into();
        if !self.values.contains_key(&column) {
            self.columns.push(column.clone());
        }
        self.values.insert(column, value);
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// Columns in the order they were inserted (i.e. the source driver's
    /// column order), the order the bulk insert builder relies on to keep
    /// its placeholder list aligned with its value list.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn estimate_size(&self) -> usize {
        self.values.values().map(Value::estimate_size).sum()
    }
}

/// Convert one PostgreSQL driver row into an [`OrderedRow`], using
/// `columns` (from schema introspection) to pick the right typed getter
/// per field — the driver itself has no dynamic "give me whatever this
/// is" accessor.
pub fn row_to_ordered(row: &Row, columns: &[DetailedColumn]) -> Result<OrderedRow> {
    let mut out = OrderedRow::new();
    for (idx, column) in columns.iter().enumerate() {
        let value = extract_value(row, idx, &column.udt_name)
            .with_context(|| format!("failed to read column '{}'", column.name))?;
        out.insert(column.name.clone(), value);
    }
    Ok(out)
}

fn extract_value(row: &Row, idx: usize, udt_name: &str) -> Result<Value> {
    let base = udt_name.strip_prefix('_').unwrap_or(udt_name);
    let is_array = udt_name.starts_with('_');

    if is_array {
        // Arrays are read back as JSON text via an explicit cast performed
        // by the caller's SELECT, or fall through to NULL if absent; the
        // executor's column list always requests `col::json` for array
        // columns, so by the time we get here this is already JSON.
        return extract_json(row, idx);
    }

    match base {
        "bool" => get_nullable::<bool>(row, idx).map(|v| v.map(Value::Bool).unwrap_or(Value::Null)),
        "int2" => get_nullable::<i16>(row, idx).map(|v| v.map(|n| Value::I64(n as i64)).unwrap_or(Value::Null)),
        "int4" => get_nullable::<i32>(row, idx).map(|v| v.map(|n| Value::I64(n as i64)).unwrap_or(Value::Null)),
        "int8" => get_nullable::<i64>(row, idx).map(|v| v.map(Value::I64).unwrap_or(Value::Null)),
        "float4" => get_nullable::<f32>(row, idx).map(|v| v.map(|n| reduce_float(n as f64)).unwrap_or(Value::Null)),
        "float8" => get_nullable::<f64>(row, idx).map(|v| v.map(reduce_float).unwrap_or(Value::Null)),
        "numeric" => get_nullable::<Decimal>(row, idx).map(|v| v.map(|d| Value::Str(d.to_string())).unwrap_or(Value::Null)),
        "uuid" => get_nullable::<Uuid>(row, idx).map(|v| v.map(|u| Value::Str(u.to_string())).unwrap_or(Value::Null)),
        "timestamp" | "timestamptz" => {
            get_nullable::<DateTime<Utc>>(row, idx).map(|v| v.map(Value::Timestamp).unwrap_or(Value::Null))
        }
        "json" | "jsonb" => extract_json(row, idx),
        "bytea" => get_nullable::<Vec<u8>>(row, idx).map(|v| v.map(Value::Bytes).unwrap_or(Value::Null)),
        // text, varchar, bpchar, enum labels, and anything else unrecognized
        // (custom domains, citext) round-trip as text, matching how the
        // spec treats unknown scalar types: pass through as a string rather
        // than fail the whole row.
        _ => get_nullable::<String>(row, idx).map(|v| v.map(Value::Str).unwrap_or(Value::Null)),
    }
}

fn extract_json(row: &Row, idx: usize) -> Result<Value> {
    Ok(get_nullable::<serde_json::Value>(row, idx)?
        .map(Value::Json)
        .unwrap_or(Value::Null))
}

fn get_nullable<'a, T>(row: &'a Row, idx: usize) -> Result<Option<T>>
where
    T: tokio_postgres::types::FromSql<'a>,
{
    row.try_get::<_, Option<T>>(idx)
        .with_context(|| format!("type mismatch reading column at index {}", idx))
}

/// `NaN`/`Infinity` have no JSON or SQL-text representation, so these
/// collapse to `NULL`, leaving any warning to the caller.
fn reduce_float(n: f64) -> Value {
    if n.is_finite() {
        Value::F64(n)
    } else {
        Value::Null
    }
}

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => b.to_sql(ty, out),
            Value::I64(i) => match *ty {
                Type::INT2 => (*i as i16).to_sql(ty, out),
                Type::INT4 => (*i as i32).to_sql(ty, out),
                _ => i.to_sql(ty, out),
            },
            Value::F64(f) => match *ty {
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                _ => f.to_sql(ty, out),
            },
            Value::Str(s) => match *ty {
                Type::UUID => Uuid::parse_str(s)?.to_sql(ty, out),
                Type::NUMERIC => s.parse::<Decimal>()?.to_sql(ty, out),
                _ => s.to_sql(ty, out),
            },
            Value::Bytes(b) => b.to_sql(ty, out),
            Value::Timestamp(t) => match *ty {
                Type::TIMESTAMP => t.naive_utc().to_sql(ty, out),
                _ => t.to_sql(ty, out),
            },
            Value::Json(j) => j.to_sql(ty, out),
        }
    }

    // The target column's real type is only known at bind time (it varies
    // per call site), so acceptance is deferred to `to_sql` itself rather
    // than checked up front; a genuine mismatch surfaces there as a
    // classifiable permanent error instead of a panic.
    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_row_preserves_insertion_order() {
        let mut row = OrderedRow::new();
        row.insert("id", Value::Str("1".to_string()));
        row.insert("name", Value::Str("a".to_string()));
        row.insert("created_at", Value::Null);
        assert_eq!(row.columns(), &["id", "name", "created_at"]);
    }

    #[test]
    fn reduce_float_collapses_nan_and_infinity_to_null() {
        assert_eq!(reduce_float(f64::NAN), Value::Null);
        assert_eq!(reduce_float(f64::INFINITY), Value::Null);
        assert_eq!(reduce_float(1.5), Value::F64(1.5));
    }

    #[test]
    fn estimate_size_counts_utf16_code_units_doubled() {
        let v = Value::Str("hello".to_string());
        assert_eq!(v.estimate_size(), 10);
    }

    #[test]
    fn null_value_has_zero_size() {
        assert_eq!(Value::Null.estimate_size(), 0);
    }

    #[test]
    fn ordered_row_size_sums_column_sizes() {
        let mut row = OrderedRow::new();
        row.insert("a", Value::Str("ab".to_string()));
        row.insert("b", Value::I64(1));
        assert_eq!(row.estimate_size(), 4 + 8);
    }
}
