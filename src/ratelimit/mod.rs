// ABOUTME: Rate Limiter (C8) - public surface
// ABOUTME: Submodules: bucket (lazy-refill token bucket), limiter (dual buckets + adaptive throttle)

pub mod bucket;
pub mod limiter;

pub use bucket::TokenBucket;
pub use limiter::RateLimiter;
