// ABOUTME: Value types returned by the diff engine's preview and paging operations

use tokio_postgres::Row;

/// Per-table comparison summary produced by `calculate_diff`.
#[derive(Debug, Clone)]
pub struct TableDiff {
    pub table_name: String,
    pub inserts: i64,
    pub updates: i64,
    pub source_row_count: i64,
    pub target_row_count: i64,
    pub sample_inserts: Vec<String>,
    pub sample_updates: Vec<String>,
}

/// One page of source rows still needing sync, per `get_rows_to_sync`.
/// `rows` holds the raw driver rows (up to `batch_size`); the extra probe
/// row used to compute `has_more` is never included.
pub struct RowPage {
    pub rows: Vec<Row>,
    pub has_more: bool,
    pub last_id: Option<String>,
}
