// ABOUTME: Rate Limiter (C8) - dual token buckets plus an adaptive throttle factor
// ABOUTME: driven by a moving average of target response times

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::sleep;

use crate::config::RateLimitConfig;

use super::bucket::TokenBucket;

const RESPONSE_WINDOW: usize = 10;
const THROTTLE_FLOOR: f64 = 0.25;
const THROTTLE_CEILING: f64 = 1.0;
const THROTTLE_STEP: f64 = 0.10;

struct Inner {
    ops_bucket: TokenBucket,
    bytes_bucket: TokenBucket,
    response_times_ms: VecDeque<u64>,
    throttle_factor: f64,
}

/// Thread-safe: both buckets' lazy refill and the adaptive controller are
/// guarded by a single mutex so concurrent callers serialize cheaply
/// rather than racing on partial updates.
pub struct RateLimiter {
    config: RateLimitConfig,
    inner: Mutex<Inner>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let max_ops = config.max_ops_per_second * config.burst_multiplier;
        let max_bytes = config.max_bytes_per_second * config.burst_multiplier;
        let inner = Inner {
            ops_bucket: TokenBucket::new(max_ops, config.max_ops_per_second),
            bytes_bucket: TokenBucket::new(max_bytes, config.max_bytes_per_second),
            response_times_ms: VecDeque::with_capacity(RESPONSE_WINDOW),
            throttle_factor: 1.0,
        };
        RateLimiter { config, inner: Mutex::new(inner) }
    }

    /// Attempts to consume `ops` operations and `bytes` bytes worth of
    /// tokens, sleeping first if either bucket is short.
    pub async fn acquire_permit(&self, ops: f64, bytes: f64) {
        loop {
            let wait = {
                let mut inner = self.inner.lock().unwrap();
                let ops_wait = inner.ops_bucket.wait_time_secs(ops);
                let bytes_wait = inner.bytes_bucket.wait_time_secs(bytes);
                ops_wait.max(bytes_wait)
            };
            if wait <= 0.0 {
                let mut inner = self.inner.lock().unwrap();
                if inner.ops_bucket.try_consume(ops) && inner.bytes_bucket.try_consume(bytes) {
                    return;
                }
                // Another waiter won the race; loop and recompute the wait.
                continue;
            }
            sleep(Duration::from_secs_f64(wait)).await;
        }
    }

    /// Feeds one observed response time into the moving average and
    /// recomputes the adaptive throttle factor.
    pub fn record_response_time(&self, duration_ms: u64) {
        let mut inner = self.inner.lock().unwrap();
        if inner.response_times_ms.len() == RESPONSE_WINDOW {
            inner.response_times_ms.pop_front();
        }
        inner.response_times_ms.push_back(duration_ms);

        let average = inner.response_times_ms.iter().sum::<u64>() as f64
            / inner.response_times_ms.len() as f64;

        let mut factor = inner.throttle_factor;
        if average > self.config.slow_response_threshold_ms as f64 {
            factor = (factor * (1.0 - THROTTLE_STEP)).max(THROTTLE_FLOOR);
        } else if average < self.config.fast_response_threshold_ms as f64 && factor < THROTTLE_CEILING {
            factor = (factor * (1.0 + THROTTLE_STEP)).min(THROTTLE_CEILING);
        }

        if (factor - inner.throttle_factor).abs() > f64::EPSILON {
            inner.throttle_factor = factor;
            let ops_rate = self.config.max_ops_per_second * factor;
            let bytes_rate = self.config.max_bytes_per_second * factor;
            inner
                .ops_bucket
                .set_capacity(ops_rate * self.config.burst_multiplier, ops_rate);
            inner
                .bytes_bucket
                .set_capacity(bytes_rate * self.config.burst_multiplier, bytes_rate);
        }
    }

    pub fn throttle_factor(&self) -> f64 {
        self.inner.lock().unwrap().throttle_factor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RateLimitConfig {
        RateLimitConfig {
            max_ops_per_second: 100.0,
            max_bytes_per_second: 1024.0,
            burst_multiplier: 1.5,
            slow_response_threshold_ms: 500,
            fast_response_threshold_ms: 100,
        }
    }

    #[tokio::test]
    async fn acquire_permit_succeeds_immediately_within_burst() {
        let limiter = RateLimiter::new(config());
        limiter.acquire_permit(10.0, 100.0).await;
        assert_eq!(limiter.throttle_factor(), 1.0);
    }

    #[test]
    fn slow_responses_shrink_throttle_factor() {
        let limiter = RateLimiter::new(config());
        for _ in 0..RESPONSE_WINDOW {
            limiter.record_response_time(600);
        }
        assert!(limiter.throttle_factor() < 1.0);
        assert!(limiter.throttle_factor() >= THROTTLE_FLOOR);
    }

    #[test]
    fn throttle_factor_never_drops_below_floor() {
        let limiter = RateLimiter::new(config());
        for _ in 0..200 {
            limiter.record_response_time(5000);
        }
        assert!(limiter.throttle_factor() >= THROTTLE_FLOOR);
    }

    #[test]
    fn fast_responses_recover_throttle_factor_toward_ceiling() {
        let limiter = RateLimiter::new(config());
        for _ in 0..RESPONSE_WINDOW {
            limiter.record_response_time(600);
        }
        let shrunk = limiter.throttle_factor();
        assert!(shrunk < 1.0);
        for _ in 0..50 {
            limiter.record_response_time(50);
        }
        assert!(limiter.throttle_factor() > shrunk);
        assert!(limiter.throttle_factor() <= THROTTLE_CEILING);
    }
}
