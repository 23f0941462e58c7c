// ABOUTME: Command implementations backing the CLI subcommands
// ABOUTME: Exports validate, diff, migrate_plan, sync, and daemon

pub mod daemon;
pub mod diff;
pub mod migrate_plan;
pub mod sync;
pub mod validate;

pub use daemon::{run_daemon, DaemonAction, DaemonArgs};
pub use diff::{run_diff, DiffArgs};
pub use migrate_plan::{run_migrate_plan, MigratePlanArgs};
pub use sync::{run_sync, SyncArgs};
pub use validate::{run_validate, ValidateArgs};
