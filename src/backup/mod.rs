// ABOUTME: Backup / Restore (C9) - public surface
// ABOUTME: Submodules: types (BackupMetadata), snapshot (pg_dump/pg_restore subprocess driving)

pub mod snapshot;
pub mod types;

pub use snapshot::{create_backup, restore_backup};
pub use types::{BackupMetadata, BackupStatus};
