// ABOUTME: Metrics Collector (C7) - public surface
// ABOUTME: Submodules: types (value structs), collector (accumulation + persistence)

pub mod collector;
pub mod types;

pub use collector::{MetricsCollector, MetricsStore};
pub use types::{JobMetricsRecord, JobStatus, MetricsSnapshot, TableMetrics};
