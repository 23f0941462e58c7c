// ABOUTME: Connection Factory (C1) - opens and closes pooled PostgreSQL clients from a URL
// ABOUTME: Owns exactly one tokio-postgres client plus its background connection task

use anyhow::{Context, Result};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use std::time::Duration;
use tokio_postgres::Client;

use crate::retry::{with_retry, RetryConfig};
use crate::utils::{strip_password_from_url, validate_connection_string};

/// A handle to one PostgreSQL connection, created per job start and
/// exclusively owned by the sync executor for that job's lifetime (spec
/// §3 `Connection`). Closed on every exit path by dropping it; the
/// background driver task aborts when the client is dropped.
pub struct Connection {
    client: Client,
    driver: tokio::task::JoinHandle<()>,
    sanitized_url: String,
}

impl Connection {
    /// Open a single connection to `url`, retrying transient failures per
    /// `retry_cfg`. TLS is negotiated opportunistically: certificate
    /// validation can be relaxed by the caller via `accept_invalid_certs`
    /// for environments with self-signed certificates (teacher's
    /// `--allow-self-signed-certs` CLI flag).
    pub async fn connect(
        url: &str,
        accept_invalid_certs: bool,
        retry_cfg: &RetryConfig,
    ) -> Result<Self> {
        validate_connection_string(url)?;

        let tls_connector = TlsConnector::builder()
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .context("failed to build TLS connector")?;
        let connector = MakeTlsConnector::new(tls_connector);

        let sanitized_url =
            strip_password_from_url(url).unwrap_or_else(|_| "<unparseable url>".to_string());

        let (client, connection) = with_retry(
            retry_cfg,
            || {
                let connector = connector.clone();
                async move {
                    tokio_postgres::connect(url, connector)
                        .await
                        .context("failed to connect to PostgreSQL")
                }
            },
            |attempt, delay, err| {
                tracing::warn!(
                    attempt,
                    ?delay,
                    url = %sanitized_url,
                    error = %err,
                    "retrying PostgreSQL connection"
                );
            },
        )
        .await?;

        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("PostgreSQL connection driver error: {}", e);
            }
        });

        Ok(Connection {
            client,
            driver,
            sanitized_url,
        })
    }

    /// Convenience wrapper around [`Connection::connect`] using the
    /// engine's default retry policy — the shape most call sites want.
    pub async fn connect_with_retry(url: &str) -> Result<Self> {
        Self::connect(url, false, &RetryConfig::default()).await
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut Client {
        &mut self.client
    }

    /// The connection's URL with any password removed, safe to log.
    pub fn sanitized_url(&self) -> &str {
        &self.sanitized_url
    }

    /// Explicitly close the connection, aborting the background driver
    /// task. Also run implicitly on `Drop`.
    pub fn close(self) {
        self.driver.abort();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// Run a one-off statement with a statement timeout applied via
/// `SET LOCAL statement_timeout` inside an implicit transaction, used by
/// preflight checks and the diff engine's batch fetch.
pub async fn with_statement_timeout<T>(
    client: &Client,
    timeout: Duration,
    query: impl std::future::Future<Output = Result<T, tokio_postgres::Error>>,
) -> Result<T> {
    let ms = timeout.as_millis().max(1);
    client
        .batch_execute(&format!("SET statement_timeout = {}", ms))
        .await
        .context("failed to set statement_timeout")?;
    let result = query.await.context("statement failed or timed out")?;
    client
        .batch_execute("SET statement_timeout = 0")
        .await
        .context("failed to reset statement_timeout")?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_rejects_malformed_url_before_attempting_tls() {
        let result = tokio::runtime::Runtime::new().unwrap().block_on(async {
            Connection::connect("not-a-postgres-url", false, &RetryConfig::default()).await
        });
        assert!(result.is_err());
    }
}
