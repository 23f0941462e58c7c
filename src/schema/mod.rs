// ABOUTME: Schema Inspector (C2) - public surface for bulk database introspection
// ABOUTME: Submodules: types (value structs), inspect (catalog queries), compat (pure helpers)

pub mod compat;
pub mod inspect;
pub mod types;

pub use compat::{are_types_compatible, can_safely_insert};
pub use inspect::{check_wraparound, inspect, inspect_table, validate_sync_requirements};
pub use types::{
    ConstraintInfo, ConstraintKind, DatabaseSchema, DetailedColumn, DetailedTableSchema, EnumType,
    ForeignKey, IndexInfo, WraparoundCheck,
};
