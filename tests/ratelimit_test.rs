// ABOUTME: Integration tests for the Rate Limiter (C8) at the public crate boundary
// ABOUTME: exercises the dual-bucket acquire path and the adaptive throttle together

use std::time::{Duration, Instant};

use pg_sync_engine::config::RateLimitConfig;
use pg_sync_engine::ratelimit::RateLimiter;

fn fast_config() -> RateLimitConfig {
    RateLimitConfig {
        max_ops_per_second: 1000.0,
        max_bytes_per_second: 1_000_000.0,
        burst_multiplier: 1.0,
        slow_response_threshold_ms: 500,
        fast_response_threshold_ms: 100,
    }
}

#[tokio::test]
async fn acquire_permit_blocks_once_burst_is_exhausted() {
    let config = RateLimitConfig {
        max_ops_per_second: 10.0,
        max_bytes_per_second: 10_000.0,
        burst_multiplier: 1.0,
        ..fast_config()
    };
    let limiter = RateLimiter::new(config);

    // Burst capacity is exactly 10 ops; the 11th must wait for a refill.
    for _ in 0..10 {
        limiter.acquire_permit(1.0, 1.0).await;
    }

    let start = Instant::now();
    limiter.acquire_permit(1.0, 1.0).await;
    assert!(start.elapsed() > Duration::from_millis(20));
}

#[tokio::test]
async fn sustained_slow_responses_reduce_effective_throughput() {
    let limiter = RateLimiter::new(fast_config());
    for _ in 0..10 {
        limiter.record_response_time(900);
    }
    assert!(limiter.throttle_factor() < 1.0);
}
