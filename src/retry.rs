// ABOUTME: Exponential backoff with jitter, timeout racing, and a circuit breaker
// ABOUTME: Shared retry primitives used by the connection factory and sync executor

use anyhow::Result;
use rand::Rng;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use crate::error::{classify, ErrorClass};

/// Configuration for [`with_retry`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_retries: 3,
            initial_delay: Duration::from_millis(2000),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Compute the backoff delay for a zero-based `attempt`, applying
/// `±20%` jitter: `min(initial * multiplier^attempt, max) ± 20%`.
fn backoff_delay(cfg: &RetryConfig, attempt: u32) -> Duration {
    let raw = cfg.initial_delay.as_secs_f64() * cfg.multiplier.powi(attempt as i32);
    let capped = raw.min(cfg.max_delay.as_secs_f64());
    let jitter_frac = rand::thread_rng().gen_range(-0.2..=0.2);
    let jittered = (capped * (1.0 + jitter_frac)).max(0.0);
    Duration::from_secs_f64(jittered)
}

/// Run `op`, retrying transient failures with exponential backoff and
/// jitter. `on_retry` is called with `(attempt, delay, &error)` before each
/// sleep. A permanent or fatal error per [`classify`] is returned
/// immediately without retrying.
pub async fn with_retry<F, Fut, T>(cfg: &RetryConfig, mut op: F, mut on_retry: impl FnMut(u32, Duration, &anyhow::Error)) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                let retryable = matches!(classify(&e), ErrorClass::Transient);
                if !retryable || attempt >= cfg.max_retries {
                    return Err(e);
                }
                let delay = backoff_delay(cfg, attempt);
                on_retry(attempt, delay, &e);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Race `fut` against a timer; returns an error if `fut` does not resolve
/// within `timeout`.
pub async fn with_timeout<Fut, T>(timeout: Duration, fut: Fut) -> Result<T>
where
    Fut: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(res) => res,
        Err(_) => Err(anyhow::anyhow!(
            "operation timed out after {:?}",
            timeout
        )),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Open-on-failure / half-open-after-reset circuit breaker guarding a
/// single downstream resource. Cheaply cloneable; shares state across
/// clones so it can be held by every table loop in a job.
#[derive(Clone)]
pub struct CircuitBreaker {
    inner: std::sync::Arc<CircuitBreakerInner>,
}

struct CircuitBreakerInner {
    threshold: u32,
    reset_timeout: Duration,
    failure_count: AtomicU32,
    opened_at_millis: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, reset_timeout: Duration) -> Self {
        CircuitBreaker {
            inner: std::sync::Arc::new(CircuitBreakerInner {
                threshold,
                reset_timeout,
                failure_count: AtomicU32::new(0),
                opened_at_millis: AtomicU64::new(0),
            }),
        }
    }

    fn state(&self) -> BreakerState {
        let opened_at = self.inner.opened_at_millis.load(Ordering::SeqCst);
        if opened_at == 0 {
            return BreakerState::Closed;
        }
        let elapsed = epoch_millis().saturating_sub(opened_at);
        if elapsed >= self.inner.reset_timeout.as_millis() as u64 {
            BreakerState::HalfOpen
        } else {
            BreakerState::Open
        }
    }

    /// Run `op` through the breaker: rejects immediately while open,
    /// allows exactly one probe while half-open, and resets the failure
    /// count on success.
    pub async fn call<F, Fut, T>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        if self.state() == BreakerState::Open {
            return Err(anyhow::anyhow!("circuit breaker open, rejecting call"));
        }

        match op().await {
            Ok(v) => {
                self.inner.failure_count.store(0, Ordering::SeqCst);
                self.inner.opened_at_millis.store(0, Ordering::SeqCst);
                Ok(v)
            }
            Err(e) => {
                let failures = self.inner.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= self.inner.threshold {
                    self.inner.opened_at_millis.store(epoch_millis(), Ordering::SeqCst);
                }
                Err(e)
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == BreakerState::Open
    }
}

fn epoch_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32 as StdAtomicU32;
    use std::sync::Arc;

    #[test]
    fn backoff_grows_and_respects_cap() {
        let cfg = RetryConfig {
            max_retries: 5,
            initial_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_millis(500),
        };
        let d0 = backoff_delay(&cfg, 0);
        let d4 = backoff_delay(&cfg, 4);
        assert!(d0.as_millis() as f64 <= 120.0);
        assert!(d4.as_millis() as f64 <= 600.0);
    }

    #[tokio::test]
    async fn with_retry_succeeds_after_transient_failures() {
        let attempts = Arc::new(StdAtomicU32::new(0));
        let cfg = RetryConfig {
            max_retries: 5,
            initial_delay: Duration::from_millis(1),
            multiplier: 1.0,
            max_delay: Duration::from_millis(5),
        };
        let a = attempts.clone();
        let result: Result<&str> = with_retry(
            &cfg,
            move || {
                let a = a.clone();
                async move {
                    let n = a.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        anyhow::bail!("connection reset by peer")
                    } else {
                        Ok("ok")
                    }
                }
            },
            |_, _, _| {},
        )
        .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn with_retry_does_not_retry_permanent_errors() {
        let attempts = Arc::new(StdAtomicU32::new(0));
        let cfg = RetryConfig::default();
        let a = attempts.clone();
        let result: Result<()> = with_retry(
            &cfg,
            move || {
                let a = a.clone();
                async move {
                    a.fetch_add(1, Ordering::SeqCst);
                    anyhow::bail!("duplicate key value violates unique constraint")
                }
            },
            |_, _, _| {},
        )
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn with_timeout_fails_when_future_is_slow() {
        let result: Result<()> = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn circuit_breaker_opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(60));
        let _ = breaker.call(|| async { anyhow::bail!("boom") as Result<()> }).await;
        let _ = breaker.call(|| async { anyhow::bail!("boom") as Result<()> }).await;
        assert!(breaker.is_open());

        let rejected = breaker.call(|| async { Ok(()) }).await;
        assert!(rejected.is_err());
    }

    #[tokio::test]
    async fn circuit_breaker_resets_failure_count_on_success() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        let _ = breaker.call(|| async { anyhow::bail!("boom") as Result<()> }).await;
        let ok = breaker.call(|| async { Ok::<_, anyhow::Error>(()) }).await;
        assert!(ok.is_ok());
        assert!(!breaker.is_open());
    }
}
