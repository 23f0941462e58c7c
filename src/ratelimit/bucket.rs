// ABOUTME: Lazy-refill token bucket - the unit of state behind each rate-limit dimension

use std::time::Instant;

/// `tokens` is refilled lazily at each access by `(now - last_refill) *
/// refill_rate`, then clamped to `max_tokens`.
pub struct TokenBucket {
    tokens: f64,
    max_tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(max_tokens: f64, refill_rate: f64) -> Self {
        TokenBucket {
            tokens: max_tokens,
            max_tokens,
            refill_rate,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;
    }

    /// Refills, then consumes `amount` tokens if available. Returns
    /// whether the consumption succeeded.
    pub fn try_consume(&mut self, amount: f64) -> bool {
        self.refill();
        if self.tokens >= amount {
            self.tokens -= amount;
            true
        } else {
            false
        }
    }

    /// How long to wait, after a refill, before `amount` tokens are
    /// available. Zero if already available.
    pub fn wait_time_secs(&mut self, amount: f64) -> f64 {
        self.refill();
        if self.tokens >= amount {
            0.0
        } else if self.refill_rate <= 0.0 {
            f64::INFINITY
        } else {
            (amount - self.tokens) / self.refill_rate
        }
    }

    pub fn set_capacity(&mut self, max_tokens: f64, refill_rate: f64) {
        self.refill();
        self.max_tokens = max_tokens;
        self.refill_rate = refill_rate;
        self.tokens = self.tokens.min(self.max_tokens);
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn starts_full() {
        let bucket = TokenBucket::new(10.0, 5.0);
        assert_eq!(bucket.tokens(), 10.0);
    }

    #[test]
    fn consumes_available_tokens() {
        let mut bucket = TokenBucket::new(10.0, 5.0);
        assert!(bucket.try_consume(4.0));
        assert!((bucket.tokens() - 6.0).abs() < 0.01);
    }

    #[test]
    fn refuses_when_insufficient() {
        let mut bucket = TokenBucket::new(5.0, 1.0);
        assert!(!bucket.try_consume(10.0));
    }

    #[test]
    fn refills_over_time() {
        let mut bucket = TokenBucket::new(10.0, 100.0);
        bucket.try_consume(10.0);
        sleep(Duration::from_millis(50));
        assert!(bucket.try_consume(1.0));
    }

    #[test]
    fn wait_time_is_zero_when_available() {
        let mut bucket = TokenBucket::new(10.0, 5.0);
        assert_eq!(bucket.wait_time_secs(5.0), 0.0);
    }

    #[test]
    fn wait_time_positive_when_insufficient() {
        let mut bucket = TokenBucket::new(1.0, 1.0);
        bucket.try_consume(1.0);
        assert!(bucket.wait_time_secs(1.0) > 0.0);
    }
}
