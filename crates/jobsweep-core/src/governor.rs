//! Per-source rate admission for polite fetching.
//!
//! Each source has an independent minimum inter-request interval. The
//! governor is a pure admission check over shared per-source state: it
//! never sleeps or schedules — callers that are denied decide for
//! themselves whether to wait until `next_available_at` or skip.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::SourceConfig;

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Granted,
    /// Denied; the earliest instant at which a new attempt may be granted.
    Denied { next_available_at: Instant },
}

impl Admission {
    pub fn is_granted(&self) -> bool {
        matches!(self, Admission::Granted)
    }
}

#[derive(Debug)]
struct GovernorInner {
    last_granted: HashMap<String, Instant>,
}

/// Thread-safe per-source rate governor.
///
/// Attempts for the same source are effectively serialized by the interval
/// itself, but the shared map is still guarded against concurrent access
/// from parallel scrape tasks of different sources.
#[derive(Clone)]
pub struct RateGovernor {
    intervals: Arc<HashMap<String, Duration>>,
    default_interval: Duration,
    inner: Arc<Mutex<GovernorInner>>,
}

impl RateGovernor {
    /// Build a governor from per-source intervals.
    ///
    /// Sources not registered here fall back to `default_interval`.
    pub fn new<'a>(
        sources: impl IntoIterator<Item = &'a SourceConfig>,
        default_interval: Duration,
    ) -> Self {
        let intervals = sources
            .into_iter()
            .map(|s| (s.id.clone(), s.min_interval))
            .collect();
        Self {
            intervals: Arc::new(intervals),
            default_interval,
            inner: Arc::new(Mutex::new(GovernorInner {
                last_granted: HashMap::new(),
            })),
        }
    }

    /// Acquires the inner mutex lock, recovering from poison if necessary.
    fn lock_inner(&self) -> std::sync::MutexGuard<'_, GovernorInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned governor mutex");
            poisoned.into_inner()
        })
    }

    fn interval_for(&self, source_id: &str) -> Duration {
        self.intervals
            .get(source_id)
            .copied()
            .unwrap_or(self.default_interval)
    }

    /// Non-blocking admission check for a fetch attempt against `source_id`.
    ///
    /// Grants when the source's minimum interval has elapsed since the last
    /// grant (or the source was never contacted); on success the grant time
    /// is recorded so the next caller sees the fresh interval.
    pub fn try_acquire(&self, source_id: &str) -> Admission {
        let interval = self.interval_for(source_id);
        let now = Instant::now();
        let mut inner = self.lock_inner();

        match inner.last_granted.get(source_id) {
            Some(&last) if now < last + interval => {
                let next_available_at = last + interval;
                tracing::debug!(
                    source = %source_id,
                    wait_ms = %(next_available_at - now).as_millis(),
                    "Rate admission denied"
                );
                Admission::Denied { next_available_at }
            }
            _ => {
                inner.last_granted.insert(source_id.to_string(), now);
                Admission::Granted
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn governor(interval: Duration) -> RateGovernor {
        let src = SourceConfig::new("acme").with_min_interval(interval);
        RateGovernor::new([&src], Duration::from_millis(100))
    }

    #[test]
    fn test_first_acquire_granted() {
        let gov = governor(Duration::from_secs(1));
        assert!(gov.try_acquire("acme").is_granted());
    }

    #[test]
    fn test_second_acquire_within_interval_denied() {
        let gov = governor(Duration::from_secs(60));
        assert!(gov.try_acquire("acme").is_granted());

        match gov.try_acquire("acme") {
            Admission::Denied { next_available_at } => {
                assert!(next_available_at > Instant::now());
            }
            Admission::Granted => panic!("second acquire should be denied"),
        }
    }

    #[test]
    fn test_acquire_after_interval_elapsed() {
        let gov = governor(Duration::from_millis(10));
        assert!(gov.try_acquire("acme").is_granted());
        std::thread::sleep(Duration::from_millis(20));
        assert!(gov.try_acquire("acme").is_granted());
    }

    #[test]
    fn test_sources_are_independent() {
        let a = SourceConfig::new("a").with_min_interval(Duration::from_secs(60));
        let b = SourceConfig::new("b").with_min_interval(Duration::from_secs(60));
        let gov = RateGovernor::new([&a, &b], Duration::from_millis(100));

        assert!(gov.try_acquire("a").is_granted());
        assert!(gov.try_acquire("b").is_granted());
        assert!(!gov.try_acquire("a").is_granted());
        assert!(!gov.try_acquire("b").is_granted());
    }

    #[test]
    fn test_unknown_source_uses_default_interval() {
        let gov = governor(Duration::from_secs(60));
        assert!(gov.try_acquire("unregistered").is_granted());
        assert!(!gov.try_acquire("unregistered").is_granted());
        std::thread::sleep(Duration::from_millis(120));
        assert!(gov.try_acquire("unregistered").is_granted());
    }

    #[test]
    fn test_denied_does_not_consume_grant() {
        let gov = governor(Duration::from_millis(50));
        assert!(gov.try_acquire("acme").is_granted());
        let denied_at = match gov.try_acquire("acme") {
            Admission::Denied { next_available_at } => next_available_at,
            Admission::Granted => panic!("should be denied"),
        };
        // A denial must not push the window further out.
        match gov.try_acquire("acme") {
            Admission::Denied { next_available_at } => {
                assert_eq!(next_available_at, denied_at);
            }
            Admission::Granted => panic!("should still be denied"),
        }
    }
}
