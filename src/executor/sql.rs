// ABOUTME: SQL builders for the executor's insert/update lanes - multi-value upsert and
// ABOUTME: single-row update, both driven entirely off already-validated identifier lists

use tokio_postgres::types::ToSql;

use crate::row::{OrderedRow, Value};
use crate::utils::quote_ident;

/// `INSERT INTO "table" (c1,c2,...) VALUES ($1,$2),($3,$4),... ON CONFLICT
/// (id) DO UPDATE SET c2 = EXCLUDED.c2, ...`. The insert path always wins
/// on conflict because the target row was observed absent at partition
/// time.
pub fn build_bulk_upsert_sql(table: &str, columns: &[String], row_count: usize) -> String {
    let quoted_cols: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let mut placeholder_idx = 1usize;
    let mut value_groups = Vec::with_capacity(row_count);
    for _ in 0..row_count {
        let placeholders: Vec<String> = (0..columns.len())
            .map(|_| {
                let p = format!("${}", placeholder_idx);
                placeholder_idx += 1;
                p
            })
            .collect();
        value_groups.push(format!("({})", placeholders.join(", ")));
    }

    let update_set: Vec<String> = columns
        .iter()
        .filter(|c| c.as_str() != "id")
        .map(|c| format!("{} = EXCLUDED.{}", quote_ident(c), quote_ident(c)))
        .collect();

    let conflict_clause = if update_set.is_empty() {
        "ON CONFLICT (id) DO NOTHING".to_string()
    } else {
        format!("ON CONFLICT (id) DO UPDATE SET {}", update_set.join(", "))
    };

    format!(
        "INSERT INTO {} ({}) VALUES {} {}",
        quote_ident(table),
        quoted_cols.join(", "),
        value_groups.join(", "),
        conflict_clause
    )
}

/// Flatten `rows` into a single positional parameter list matching the
/// placeholder order [`build_bulk_upsert_sql`] produced for the same
/// `columns` list.
pub fn bind_insert_params<'a>(
    rows: &'a [OrderedRow],
    columns: &[String],
) -> Vec<&'a (dyn ToSql + Sync)> {
    let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(rows.len() * columns.len());
    for row in rows {
        for column in columns {
            let value = row.get(column).unwrap_or(&Value::Null);
            params.push(value as &(dyn ToSql + Sync));
        }
    }
    params
}

/// `UPDATE "table" SET c1 = $2, c2 = $3 WHERE id = $1`, excluding `id`
/// and any generated columns from the SET list.
pub fn build_update_sql(table: &str, set_columns: &[String]) -> String {
    let assignments: Vec<String> = set_columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = ${}", quote_ident(c), i + 2))
        .collect();
    format!(
        "UPDATE {} SET {} WHERE id = $1",
        quote_ident(table),
        assignments.join(", ")
    )
}

pub fn bind_update_params<'a>(
    row: &'a OrderedRow,
    id_value: &'a Value,
    set_columns: &[String],
) -> Vec<&'a (dyn ToSql + Sync)> {
    let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(set_columns.len() + 1);
    params.push(id_value as &(dyn ToSql + Sync));
    for column in set_columns {
        let value = row.get(column).unwrap_or(&Value::Null);
        params.push(value as &(dyn ToSql + Sync));
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bulk_upsert_sql_has_one_value_group_per_row() {
        let cols = vec!["id".to_string(), "name".to_string()];
        let sql = build_bulk_upsert_sql("users", &cols, 2);
        assert!(sql.contains("($1, $2),($3, $4)".replace(',', ", ").as_str()) || sql.contains("($1, $2), ($3, $4)"));
        assert!(sql.contains("ON CONFLICT (id) DO UPDATE SET \"name\" = EXCLUDED.\"name\""));
        assert!(!sql.contains("\"id\" = EXCLUDED"));
    }

    #[test]
    fn bulk_upsert_sql_with_only_id_column_does_nothing_on_conflict() {
        let cols = vec!["id".to_string()];
        let sql = build_bulk_upsert_sql("users", &cols, 1);
        assert!(sql.contains("DO NOTHING"));
    }

    #[test]
    fn update_sql_places_id_first_and_sets_rest() {
        let cols = vec!["name".to_string(), "updated_at".to_string()];
        let sql = build_update_sql("users", &cols);
        assert_eq!(
            sql,
            "UPDATE \"users\" SET \"name\" = $2, \"updated_at\" = $3 WHERE id = $1"
        );
    }
}
