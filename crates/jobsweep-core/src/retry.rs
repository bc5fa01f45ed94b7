//! Retry policy with exponential backoff and full jitter.
//!
//! The policy decides whether a failed fetch is worth another attempt and
//! how long to wait first. Delays grow as `base_delay * 2^(n-1)` capped at
//! `max_delay`; the actual wait is drawn uniformly from `[0, bound]` so
//! sources sharing a deadline don't retry in lockstep.

use std::time::Duration;

use crate::error::AppError;

/// Decision returned by [`RetryPolicy::decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    GiveUp,
}

impl RetryDecision {
    pub fn should_retry(&self) -> bool {
        matches!(self, RetryDecision::Retry { .. })
    }
}

/// Exponential backoff policy for a single source.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts allowed (first try included).
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Unjittered upper bound for the delay after `failure_count`
    /// consecutive failures (1-indexed): `min(base * 2^(n-1), max)`.
    pub fn delay_bound(&self, failure_count: u32) -> Duration {
        let exp = failure_count.saturating_sub(1).min(63);
        let bound_ms = (self.base_delay.as_millis() as u128) << exp;
        let max_ms = self.max_delay.as_millis() as u128;
        Duration::from_millis(bound_ms.min(max_ms) as u64)
    }

    /// Decide whether to retry after `failure_count` consecutive failures
    /// ending in `error`.
    ///
    /// Permanent failures give up immediately regardless of the count; the
    /// classification comes from the adapter's error variant, not from this
    /// policy. Transient failures retry with full jitter until
    /// `max_attempts` is reached.
    pub fn decide(&self, failure_count: u32, error: &AppError) -> RetryDecision {
        if !error.is_retryable() {
            return RetryDecision::GiveUp;
        }
        if failure_count >= self.max_attempts {
            return RetryDecision::GiveUp;
        }
        let bound = self.delay_bound(failure_count);
        RetryDecision::Retry {
            delay: jitter(bound),
        }
    }
}

/// Draw a duration uniformly from `[0, bound]`.
fn jitter(bound: Duration) -> Duration {
    let bound_ms = bound.as_millis() as u64;
    if bound_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand_ms(bound_ms + 1))
}

// ---------------------------------------------------------------------------
// Deterministic jitter based on std — avoids pulling in the `rand` crate.
// Uses a simple xorshift seeded from the current time.
// ---------------------------------------------------------------------------

fn rand_ms(modulus: u64) -> u64 {
    if modulus == 0 {
        return 0;
    }
    // Seed from high-resolution clock — good enough for jitter, not crypto.
    let mut x = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    // xorshift64
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    x % modulus
}
