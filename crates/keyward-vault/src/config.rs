//! Vault tunables.
//!
//! Read from the `[vault]` table of `config/default.toml`:
//!
//! ```toml
//! [vault]
//! session_lifetime_secs = 86400
//! lockout_window_secs = 900
//! max_failed_attempts = 5
//! rate_limit_window_secs = 60
//! max_requests_per_window = 60
//! ```
//!
//! Every key is optional. A missing file yields the defaults.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, VaultError};

/// Runtime configuration for the vault and its abuse guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultConfig {
    /// How long a stored credential stays readable.
    pub session_lifetime: Duration,
    /// How long a lockout lasts, measured from the first failure.
    pub lockout_window: Duration,
    /// Failures within `lockout_window` that lock the provider.
    pub max_failed_attempts: u32,
    /// Length of the rate limiter's sliding window.
    pub rate_limit_window: Duration,
    /// Actions allowed per provider within `rate_limit_window`.
    pub max_requests_per_window: u32,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            session_lifetime: Duration::from_secs(24 * 60 * 60),
            lockout_window: Duration::from_secs(15 * 60),
            max_failed_attempts: 5,
            rate_limit_window: Duration::from_secs(60),
            max_requests_per_window: 60,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Root {
    #[serde(default)]
    vault: Option<VaultToml>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct VaultToml {
    session_lifetime_secs: Option<u64>,
    lockout_window_secs: Option<u64>,
    max_failed_attempts: Option<u32>,
    rate_limit_window_secs: Option<u64>,
    max_requests_per_window: Option<u32>,
}

impl VaultConfig {
    /// Load from a TOML file. A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Config`] if the file cannot be read, is not
    /// valid TOML, or sets a tunable to zero.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| VaultError::Config {
            reason: format!("cannot read {}: {e}", path.display()),
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::info!(path = %path.display(), "vault configuration loaded");
        Ok(config)
    }

    /// Parse from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let root: Root = toml::from_str(content).map_err(|e| VaultError::Config {
            reason: e.to_string(),
        })?;

        let defaults = Self::default();
        let Some(raw) = root.vault else {
            return Ok(defaults);
        };

        let config = Self {
            session_lifetime: raw
                .session_lifetime_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.session_lifetime),
            lockout_window: raw
                .lockout_window_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.lockout_window),
            max_failed_attempts: raw
                .max_failed_attempts
                .unwrap_or(defaults.max_failed_attempts),
            rate_limit_window: raw
                .rate_limit_window_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.rate_limit_window),
            max_requests_per_window: raw
                .max_requests_per_window
                .unwrap_or(defaults.max_requests_per_window),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject tunables that would disable a safety property.
    pub fn validate(&self) -> Result<()> {
        let zero = |name: &str| VaultError::Config {
            reason: format!("{name} must be greater than zero"),
        };
        if self.session_lifetime.is_zero() {
            return Err(zero("session_lifetime"));
        }
        if self.lockout_window.is_zero() {
            return Err(zero("lockout_window"));
        }
        if self.max_failed_attempts == 0 {
            return Err(zero("max_failed_attempts"));
        }
        if self.rate_limit_window.is_zero() {
            return Err(zero("rate_limit_window"));
        }
        if self.max_requests_per_window == 0 {
            return Err(zero("max_requests_per_window"));
        }
        Ok(())
    }
}
