//! Retry and backoff policy.
//!
//! Two consumers: the announcer's self-announcement schedule (1 s tripling
//! to a 1 h cap) and bounded recovery from transient socket failures
//! (send-socket acquisition, accept errors). The original design spun
//! forever on the latter; here persistent failure is reported as a startup
//! error after a fixed number of attempts.

use std::time::Duration;

/// A growing delay: each call to `next_delay` returns the current delay
/// and multiplies it by `factor`, capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    factor: u32,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, factor: u32, max: Duration) -> Self {
        Self {
            next: initial,
            factor,
            max,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let current = self.next.min(self.max);
        self.next = current
            .checked_mul(self.factor)
            .unwrap_or(self.max)
            .min(self.max);
        current
    }
}

/// Bounded retry: how many attempts a transient operation gets, and how
/// the delay between them grows.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub factor: u32,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            factor: 2,
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.initial_delay, self.factor, self.max_delay)
    }
}
