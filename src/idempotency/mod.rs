// ABOUTME: Idempotency Tracker (C6) - at-most-once terminal operation per (job, table, row)
// ABOUTME: Submodules: types (ProcessedRow/RowKey), store (two-tier store composition)

pub mod store;
pub mod types;

pub use store::{
    DurableStore, EphemeralStore, IdempotencyTracker, InMemoryEphemeralStore, DEFAULT_BULK_BATCH_SIZE,
    DEFAULT_TTL,
};
pub use types::{Operation, ProcessedRow, RowKey};
