//! Session credential vault for keyward.
//!
//! Stores third-party API keys encrypted at rest (AES-256-GCM), expires them
//! after a session lifetime, and guards each provider against brute-force
//! writes and request floods.
//!
//! # Modules
//!
//! - [`crypto`]: AES-256-GCM encrypt/decrypt, PBKDF2 key derivation.
//! - [`key`]: master key sourcing (raw, passphrase, development fallback).
//! - [`record`]: the versioned on-storage record format.
//! - [`guard`]: per-provider lockout and sliding-window rate limiting.
//! - [`vault`]: [`CredentialVault`], tying the above to a
//!   [`KeyValueStore`](keyward_store::KeyValueStore).
//! - [`config`]: TOML configuration with defaults.
//! - [`error`]: unified error type.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use keyward_store::{MemoryStore, SystemClock};
//! use keyward_vault::{AbuseGuard, CredentialVault, GuardConfig, MasterKey, VaultConfig};
//!
//! # async fn example() -> keyward_vault::Result<()> {
//! let clock = Arc::new(SystemClock);
//! let config = VaultConfig::default();
//! let guard = Arc::new(AbuseGuard::new(GuardConfig::from(&config), clock.clone()));
//! let vault = CredentialVault::new(
//!     Arc::new(MemoryStore::new(clock.clone())),
//!     guard,
//!     MasterKey::from_env(),
//!     clock,
//!     config,
//! );
//!
//! vault.set_credential("openai", "sk-...").await?;
//! assert!(vault.get_credential("openai").await.is_some());
//!
//! if vault.guard().can_proceed("openai") {
//!     // call the provider
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod crypto;
pub mod error;
pub mod guard;
pub mod key;
pub mod record;
pub mod vault;

// Re-export the most commonly used types at the crate root for convenience.
pub use config::VaultConfig;
pub use error::{Result, VaultError};
pub use guard::{AbuseGuard, GuardConfig, LockoutPolicy, RateLimiter};
pub use key::{KeySource, MasterKey};
pub use record::EncryptedRecord;
pub use vault::{CredentialVault, WriteTicket};
