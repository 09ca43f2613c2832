//! Sliding-window rate limiter.
//!
//! Each provider owns a queue of call timestamps. A call first drops
//! timestamps that left the window, then either records itself or is
//! refused. Prune, count and append happen under the provider's
//! [`DashMap`] entry lock, so concurrent callers can never both observe the
//! same pre-update count.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use keyward_store::Clock;
use keyward_store::clock::duration_ms;

/// Outcome of a [`RateLimiter::try_acquire`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// The call was recorded; `remaining` more fit in the window.
    Allowed { remaining: u32 },
    /// The window is full; the oldest slot frees up after `retry_after`.
    Denied { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Per-provider sliding-window limiter.
pub struct RateLimiter {
    windows: DashMap<String, VecDeque<i64>>,
    max_requests: u32,
    window_ms: i64,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: DashMap::new(),
            max_requests: max_requests.max(1),
            window_ms: duration_ms(window),
            clock,
        }
    }

    /// Atomically prune, check and record one call for `provider`.
    pub fn try_acquire(&self, provider: &str) -> RateDecision {
        let now = self.clock.now_ms();
        let cap = self.max_requests as usize;

        let mut window = self.windows.entry(provider.to_string()).or_default();
        while window
            .front()
            .is_some_and(|&t| now.saturating_sub(t) >= self.window_ms)
        {
            window.pop_front();
        }

        if window.len() >= cap {
            let oldest = window.front().copied().unwrap_or(now);
            let wait = oldest
                .saturating_add(self.window_ms)
                .saturating_sub(now)
                .max(0);
            drop(window);
            tracing::debug!(provider, "rate limit reached");
            return RateDecision::Denied {
                retry_after: Duration::from_millis(wait.unsigned_abs()),
            };
        }

        window.push_back(now);
        let remaining = u32::try_from(cap - window.len()).unwrap_or(0);
        RateDecision::Allowed { remaining }
    }

    /// `true` if the call was allowed and recorded.
    pub fn check_and_record(&self, provider: &str) -> bool {
        self.try_acquire(provider).is_allowed()
    }

    /// Calls still available in the current window, without recording one.
    pub fn remaining(&self, provider: &str) -> u32 {
        let now = self.clock.now_ms();
        let used = match self.windows.entry(provider.to_string()) {
            Entry::Vacant(_) => 0,
            Entry::Occupied(mut occupied) => {
                let window = occupied.get_mut();
                while window
                    .front()
                    .is_some_and(|&t| now.saturating_sub(t) >= self.window_ms)
                {
                    window.pop_front();
                }
                if window.is_empty() {
                    occupied.remove();
                    0
                } else {
                    window.len()
                }
            }
        };
        u32::try_from((self.max_requests as usize).saturating_sub(used)).unwrap_or(0)
    }

    /// Forget the window for `provider`.
    pub fn clear(&self, provider: &str) {
        self.windows.remove(provider);
    }

    /// Forget every provider.
    pub fn reset(&self) {
        self.windows.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyward_store::ManualClock;

    fn limiter(max: u32, window: Duration) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(5_000_000));
        (RateLimiter::new(max, window, clock.clone()), clock)
    }

    #[test]
    fn allows_up_to_cap_then_denies() {
        let (limiter, _) = limiter(3, Duration::from_secs(60));
        assert_eq!(
            limiter.try_acquire("openai"),
            RateDecision::Allowed { remaining: 2 }
        );
        assert!(limiter.check_and_record("openai"));
        assert!(limiter.check_and_record("openai"));
        assert_eq!(
            limiter.try_acquire("openai"),
            RateDecision::Denied {
                retry_after: Duration::from_secs(60)
            }
        );
    }

    #[test]
    fn denied_calls_are_not_recorded() {
        let (limiter, clock) = limiter(1, Duration::from_secs(10));
        assert!(limiter.check_and_record("openai"));
        clock.advance(Duration::from_secs(5));
        assert!(!limiter.check_and_record("openai"));

        // Only the first call occupies the window, so it frees at t0 + 10s.
        clock.advance(Duration::from_secs(5));
        assert!(limiter.check_and_record("openai"));
    }

    #[test]
    fn window_slides() {
        let (limiter, clock) = limiter(2, Duration::from_secs(10));
        assert!(limiter.check_and_record("openai"));
        clock.advance(Duration::from_secs(6));
        assert!(limiter.check_and_record("openai"));
        assert!(!limiter.check_and_record("openai"));

        clock.advance(Duration::from_secs(4));
        assert!(limiter.check_and_record("openai"));
        assert!(!limiter.check_and_record("openai"));
    }

    #[test]
    fn remaining_does_not_record() {
        let (limiter, clock) = limiter(2, Duration::from_secs(1));
        assert_eq!(limiter.remaining("openai"), 2);
        limiter.check_and_record("openai");
        assert_eq!(limiter.remaining("openai"), 1);
        assert_eq!(limiter.remaining("openai"), 1);

        clock.advance(Duration::from_secs(1));
        assert_eq!(limiter.remaining("openai"), 2);
    }

    #[test]
    fn huge_window_does_not_overflow() {
        let (limiter, _) = limiter(1, Duration::from_secs(u64::MAX));
        assert!(limiter.check_and_record("openai"));
        match limiter.try_acquire("openai") {
            RateDecision::Denied { retry_after } => assert!(retry_after > Duration::from_secs(1)),
            other => panic!("expected Denied, got {other:?}"),
        }
        assert_eq!(limiter.remaining("openai"), 0);
    }

    #[test]
    fn providers_are_isolated() {
        let (limiter, _) = limiter(1, Duration::from_secs(60));
        assert!(limiter.check_and_record("openai"));
        assert!(!limiter.check_and_record("openai"));
        assert!(limiter.check_and_record("anthropic"));
    }
}
