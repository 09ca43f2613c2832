//! Brute-force lockout.
//!
//! Per provider, a bounded failure counter inside a fixed window that starts
//! at the first failure:
//!
//! ```text
//!            failures < max                 failures == max
//!   Open  ───────────────────▶  Open  ───────────────────────▶  Locked
//!    ▲                                                            │
//!    └──── now - window_start >= window, or record_success ───────┘
//! ```
//!
//! An expired record is discarded, never decremented. Every read-modify-write
//! happens under the [`DashMap`] shard lock for that provider.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use keyward_store::Clock;
use keyward_store::clock::duration_ms;

/// Failure bookkeeping for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptRecord {
    pub failure_count: u32,
    /// Epoch milliseconds of the first failure in the current window.
    pub window_start: i64,
}

/// Lock state reported by [`LockoutPolicy::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Open,
    Locked { retry_after: Duration },
}

/// Time-boxed failed-attempt counter gating credential writes.
pub struct LockoutPolicy {
    records: DashMap<String, AttemptRecord>,
    max_failed_attempts: u32,
    window_ms: i64,
    clock: Arc<dyn Clock>,
}

impl LockoutPolicy {
    pub fn new(max_failed_attempts: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            max_failed_attempts: max_failed_attempts.max(1),
            window_ms: duration_ms(window),
            clock,
        }
    }

    /// Count a failure. Starts a fresh window if none is active.
    pub fn record_failure(&self, provider: &str) {
        let now = self.clock.now_ms();
        let mut entry = self
            .records
            .entry(provider.to_string())
            .or_insert(AttemptRecord {
                failure_count: 0,
                window_start: now,
            });

        if entry.failure_count == 0 || now.saturating_sub(entry.window_start) >= self.window_ms {
            *entry = AttemptRecord {
                failure_count: 1,
                window_start: now,
            };
        } else {
            entry.failure_count = entry.failure_count.saturating_add(1);
        }

        let count = entry.failure_count;
        drop(entry);

        if count >= self.max_failed_attempts {
            tracing::warn!(provider, failures = count, "provider locked out");
        } else {
            tracing::debug!(provider, failures = count, "failed attempt recorded");
        }
    }

    /// Current state, discarding an expired record on the way.
    pub fn state(&self, provider: &str) -> LockState {
        let now = self.clock.now_ms();

        if self
            .records
            .remove_if(provider, |_, r| now.saturating_sub(r.window_start) >= self.window_ms)
            .is_some()
        {
            tracing::debug!(provider, "lockout window elapsed, record discarded");
            return LockState::Open;
        }

        match self.records.get(provider) {
            Some(r) if r.failure_count >= self.max_failed_attempts => {
                let remaining = r
                    .window_start
                    .saturating_add(self.window_ms)
                    .saturating_sub(now)
                    .max(0);
                LockState::Locked {
                    retry_after: Duration::from_millis(remaining.unsigned_abs()),
                }
            }
            _ => LockState::Open,
        }
    }

    /// `true` unless the provider is locked.
    pub fn check_open(&self, provider: &str) -> bool {
        self.state(provider) == LockState::Open
    }

    /// Forget every failure for `provider`.
    pub fn clear(&self, provider: &str) {
        if self.records.remove(provider).is_some() {
            tracing::debug!(provider, "lockout record cleared");
        }
    }

    /// Live failure count, or 0 if none or expired.
    pub fn failure_count(&self, provider: &str) -> u32 {
        let now = self.clock.now_ms();
        self.records
            .get(provider)
            .filter(|r| now.saturating_sub(r.window_start) < self.window_ms)
            .map(|r| r.failure_count)
            .unwrap_or(0)
    }

    /// Snapshot of the raw record, expired or not.
    pub fn record(&self, provider: &str) -> Option<AttemptRecord> {
        self.records.get(provider).map(|r| *r)
    }

    /// Forget every provider.
    pub fn reset(&self) {
        self.records.clear();
    }
}
