// ABOUTME: Thin Postgres connection helpers used by pre-flight privilege checks
// ABOUTME: Submodule: privileges (REPLICATION/CREATEDB/SELECT checks ahead of schema validation)

pub mod privileges;

pub use privileges::{
    check_source_privileges, check_table_select_permissions, check_target_privileges,
    check_wal_level, PrivilegeCheck, TablePermissionCheck,
};

use anyhow::{Context, Result};
use tokio_postgres::Client;

use crate::retry::{with_retry, RetryConfig};

/// Open a bare `tokio_postgres::Client` for a one-off privilege/permission
/// query, outside the lifetime of a [`crate::connection::Connection`].
/// Pre-flight checks run before a job's connections are opened, so they
/// need their own short-lived client.
pub async fn connect(url: &str) -> Result<Client> {
    let (client, connection) = tokio_postgres::connect(url, tokio_postgres::NoTls)
        .await
        .context("failed to connect to database")?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::warn!(error = %e, "preflight connection task ended with error");
        }
    });
    Ok(client)
}

/// Same as [`connect`] wrapped in the shared exponential-backoff retry
/// primitive, reused here for the cheaper pre-flight probe rather than
/// duplicating backoff logic.
pub async fn connect_with_retry(url: &str) -> Result<Client> {
    let cfg = RetryConfig::default();
    with_retry(&cfg, || connect(url), |attempt, delay, err| {
        tracing::warn!(attempt, ?delay, error = %err, "preflight connection attempt failed, retrying");
    })
    .await
}
