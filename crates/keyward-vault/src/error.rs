//! Vault error types.
//!
//! Every public API in this crate returns [`VaultError`]. The variants fall
//! into two groups:
//!
//! - **Expected conditions** ([`Validation`](VaultError::Validation),
//!   [`Locked`](VaultError::Locked), [`RateLimited`](VaultError::RateLimited),
//!   [`Superseded`](VaultError::Superseded)): recoverable, always surfaced
//!   to the caller, each with a stable user-facing reason from
//!   [`VaultError::user_message`].
//! - **Failures** (integrity, storage, crypto, config): something is broken.

use std::time::Duration;

use keyward_store::StoreError;

/// Unified error type for the keyward credential vault.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    // -- Expected conditions ------------------------------------------------
    /// The credential or provider identifier is empty or malformed.
    #[error("invalid input: {reason}")]
    Validation { reason: String },

    /// Writes for this provider are blocked after repeated failures.
    #[error("too many failed attempts for provider={provider}, retry in {}s", .retry_after.as_secs())]
    Locked {
        provider: String,
        retry_after: Duration,
    },

    /// The per-provider sliding window is full.
    #[error("rate limit exceeded for provider={provider}, retry in {}ms", .retry_after.as_millis())]
    RateLimited {
        provider: String,
        retry_after: Duration,
    },

    /// A newer write or a removal for the same provider was issued after
    /// this write began; this one was abandoned without touching state.
    #[error("write for provider={provider} was superseded by a newer request")]
    Superseded { provider: String },

    // -- Crypto errors ------------------------------------------------------
    /// Authentication failed on decrypt: tampered data or wrong key.
    #[error("integrity check failed: {reason}")]
    Integrity { reason: String },

    /// Encryption failed (e.g. invalid key length, RNG failure).
    #[error("encryption failed: {reason}")]
    EncryptionFailed { reason: String },

    // -- Storage ------------------------------------------------------------
    /// The underlying key/value store is unavailable or corrupt.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    // -- Configuration ------------------------------------------------------
    /// The configuration file or encryption key is unusable.
    #[error("invalid configuration: {reason}")]
    Config { reason: String },

    // -- Generic ------------------------------------------------------------
    /// Catch-all for unexpected internal errors. Prefer a typed variant.
    #[error("internal vault error: {0}")]
    Internal(String),
}

impl VaultError {
    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Whether this is an expected, user-recoverable condition rather than a
    /// defect or infrastructure failure.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::Locked { .. }
                | Self::RateLimited { .. }
                | Self::Superseded { .. }
        )
    }

    /// A stable reason suitable for showing to an end user. Never contains
    /// secret material.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation { reason } => format!("The API key was rejected: {reason}."),
            Self::Locked { retry_after, .. } => format!(
                "Too many failed attempts. Please try again in {} minute(s).",
                retry_after.as_secs().div_ceil(60).max(1)
            ),
            Self::RateLimited { retry_after, .. } => format!(
                "Too many requests. Please wait {} second(s) and try again.",
                retry_after.as_secs().max(1)
            ),
            Self::Superseded { .. } => {
                "A newer API key was submitted; this one was discarded.".to_string()
            }
            Self::Integrity { .. } | Self::EncryptionFailed { .. } => {
                "The API key could not be secured. Please enter it again.".to_string()
            }
            Self::Storage(_) => {
                "Session storage is unavailable. Please enter the API key again.".to_string()
            }
            Self::Config { .. } | Self::Internal(_) => {
                "The credential vault is misconfigured.".to_string()
            }
        }
    }
}

/// Convenience alias used throughout the vault crate.
pub type Result<T> = std::result::Result<T, VaultError>;
