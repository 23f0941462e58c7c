// ABOUTME: Cancellation and deadline handles shared across a sync job's tasks
// ABOUTME: Replaces ad hoc global cancellation/start-time maps with a per-job handle

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A cheaply-cloneable handle threaded through every task spawned for one
/// job: the diff reader, the upsert writer, the reconciler. Checked between
/// batches so cancellation and job timeouts take effect at a batch boundary
/// rather than mid-transaction.
#[derive(Clone)]
pub struct JobControl {
    inner: Arc<Inner>,
}

struct Inner {
    cancelled: AtomicBool,
    started_at: Instant,
    timeout: Option<Duration>,
}

impl JobControl {
    /// Create a new handle for a job starting now, with an optional overall
    /// wall-clock timeout.
    pub fn new(timeout: Option<Duration>) -> Self {
        JobControl {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                started_at: Instant::now(),
                timeout,
            }),
        }
    }

    /// Mark the job cancelled. Safe to call from any task holding a clone;
    /// idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    /// True if `cancel()` was called on this handle or any clone of it.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// True if the job's overall timeout (if any) has elapsed.
    pub fn is_timed_out(&self) -> bool {
        match self.inner.timeout {
            Some(d) => self.inner.started_at.elapsed() >= d,
            None => false,
        }
    }

    /// Convenience check combining cancellation and timeout, for the common
    /// "should I stop before starting the next batch" guard.
    pub fn should_stop(&self) -> bool {
        self.is_cancelled() || self.is_timed_out()
    }

    pub fn elapsed(&self) -> Duration {
        self.inner.started_at.elapsed()
    }
}

impl Default for JobControl {
    fn default() -> Self {
        JobControl::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_control_is_not_cancelled_or_timed_out() {
        let c = JobControl::new(None);
        assert!(!c.is_cancelled());
        assert!(!c.is_timed_out());
        assert!(!c.should_stop());
    }

    #[test]
    fn cancel_is_visible_across_clones() {
        let c = JobControl::new(None);
        let clone = c.clone();
        clone.cancel();
        assert!(c.is_cancelled());
        assert!(c.should_stop());
    }

    #[test]
    fn zero_timeout_is_immediately_timed_out() {
        let c = JobControl::new(Some(Duration::from_secs(0)));
        std::thread::sleep(Duration::from_millis(5));
        assert!(c.is_timed_out());
        assert!(c.should_stop());
    }

    #[test]
    fn no_timeout_never_times_out() {
        let c = JobControl::new(None);
        assert!(!c.is_timed_out());
    }
}
