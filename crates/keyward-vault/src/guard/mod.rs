//! Abuse protection keyed by provider.
//!
//! [`AbuseGuard`] composes two independent policies:
//!
//! - [`LockoutPolicy`] gates credential *writes* after repeated failures.
//! - [`RateLimiter`] gates any provider-scoped *action* (form submit,
//!   outbound request) with a sliding window.
//!
//! The guard is an ordinary value: build one per process (or per test),
//! share it through an `Arc`, and reset it when needed. Its decision methods
//! are synchronous and never hold a lock across an `.await`.
//!
//! # Example
//!
//! ```rust
//! # use std::sync::Arc;
//! # use keyward_store::SystemClock;
//! # use keyward_vault::guard::{AbuseGuard, GuardConfig};
//! let guard = AbuseGuard::new(GuardConfig::default(), Arc::new(SystemClock));
//!
//! if guard.can_proceed("openai") {
//!     // send the request
//! }
//! assert!(guard.is_open("openai"));
//! ```

mod lockout;
mod rate_limit;

use std::sync::Arc;
use std::time::Duration;

use keyward_store::Clock;

pub use lockout::{AttemptRecord, LockState, LockoutPolicy};
pub use rate_limit::{RateDecision, RateLimiter};

use crate::config::VaultConfig;
use crate::error::{Result, VaultError};

/// Tunables for [`AbuseGuard`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardConfig {
    pub max_failed_attempts: u32,
    pub lockout_window: Duration,
    pub max_requests_per_window: u32,
    pub rate_limit_window: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self::from(&VaultConfig::default())
    }
}

impl From<&VaultConfig> for GuardConfig {
    fn from(config: &VaultConfig) -> Self {
        Self {
            max_failed_attempts: config.max_failed_attempts,
            lockout_window: config.lockout_window,
            max_requests_per_window: config.max_requests_per_window,
            rate_limit_window: config.rate_limit_window,
        }
    }
}

/// Per-provider lockout and rate limiting.
pub struct AbuseGuard {
    lockout: LockoutPolicy,
    rate: RateLimiter,
}

impl AbuseGuard {
    pub fn new(config: GuardConfig, clock: Arc<dyn Clock>) -> Self {
        tracing::debug!(
            max_failed_attempts = config.max_failed_attempts,
            lockout_window_secs = config.lockout_window.as_secs(),
            max_requests = config.max_requests_per_window,
            rate_window_secs = config.rate_limit_window.as_secs(),
            "abuse guard created"
        );
        Self {
            lockout: LockoutPolicy::new(
                config.max_failed_attempts,
                config.lockout_window,
                Arc::clone(&clock),
            ),
            rate: RateLimiter::new(
                config.max_requests_per_window,
                config.rate_limit_window,
                clock,
            ),
        }
    }

    // -- Rate limiter -------------------------------------------------------

    /// Record one action for `provider` if the window has room.
    pub fn can_proceed(&self, provider: &str) -> bool {
        self.rate.check_and_record(provider)
    }

    /// Like [`can_proceed`](Self::can_proceed), but reports a refusal as
    /// [`VaultError::RateLimited`].
    pub fn ensure_can_proceed(&self, provider: &str) -> Result<()> {
        match self.rate.try_acquire(provider) {
            RateDecision::Allowed { .. } => Ok(()),
            RateDecision::Denied { retry_after } => Err(VaultError::RateLimited {
                provider: provider.to_string(),
                retry_after,
            }),
        }
    }

    pub fn remaining_requests(&self, provider: &str) -> u32 {
        self.rate.remaining(provider)
    }

    // -- Lockout ------------------------------------------------------------

    /// `true` unless writes for `provider` are locked out.
    pub fn is_open(&self, provider: &str) -> bool {
        self.lockout.check_open(provider)
    }

    /// Like [`is_open`](Self::is_open), but reports a lockout as
    /// [`VaultError::Locked`].
    pub fn ensure_open(&self, provider: &str) -> Result<()> {
        match self.lockout.state(provider) {
            LockState::Open => Ok(()),
            LockState::Locked { retry_after } => Err(VaultError::Locked {
                provider: provider.to_string(),
                retry_after,
            }),
        }
    }

    pub fn record_failure(&self, provider: &str) {
        self.lockout.record_failure(provider);
    }

    /// A successful write clears the provider's failure record.
    pub fn record_success(&self, provider: &str) {
        self.lockout.clear(provider);
    }

    pub fn failure_count(&self, provider: &str) -> u32 {
        self.lockout.failure_count(provider)
    }

    // -- Reset --------------------------------------------------------------

    /// Forget lockout and rate state for one provider.
    pub fn reset_provider(&self, provider: &str) {
        self.lockout.clear(provider);
        self.rate.clear(provider);
    }

    /// Forget all state.
    pub fn reset(&self) {
        self.lockout.reset();
        self.rate.reset();
        tracing::debug!("abuse guard reset");
    }

    pub fn lockout(&self) -> &LockoutPolicy {
        &self.lockout
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate
    }
}
