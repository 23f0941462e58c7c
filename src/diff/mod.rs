// ABOUTME: Diff Engine (C5) - per-table preview counts and keyset-paginated sync rows
// ABOUTME: Submodules: types (value structs), preview (calculateDiff), paginate (getRowsToSync)

pub mod paginate;
pub mod preview;
pub mod types;

pub use paginate::get_rows_to_sync;
pub use preview::calculate_diff;
pub use types::{RowPage, TableDiff};
