//! Process-wide encryption key provisioning.
//!
//! The key comes from the `ENCRYPTION_KEY` environment variable:
//!
//! | Value                                  | Resulting key                          |
//! |----------------------------------------|----------------------------------------|
//! | base64 that decodes to exactly 32 bytes| used verbatim                          |
//! | any other non-empty string             | PBKDF2-stretched under the app salt    |
//! | unset or empty                         | [`DEVELOPMENT_FALLBACK_KEY`], stretched|
//!
//! The fallback exists so local development works out of the box. It is
//! public knowledge and offers no protection; every use is logged at `warn`.

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::crypto::{self, KEY_LEN};
use crate::error::{Result, VaultError};

/// Environment variable holding the encryption key.
pub const ENCRYPTION_KEY_ENV: &str = "ENCRYPTION_KEY";

/// Development-only passphrase used when no key is configured.
/// NOT SECRET. NEVER USE IN PRODUCTION.
pub const DEVELOPMENT_FALLBACK_KEY: &str = "keyward-development-fallback-key-not-for-production";

/// Application salt for passphrase stretching. Changing it invalidates
/// every record sealed under a passphrase-derived key.
const APP_SALT: &[u8; 32] = b"keyward-master-key-salt-v1\x00\x00\x00\x00\x00\x00";

/// Where the active key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// Raw 32-byte key supplied as base64.
    Raw,
    /// Passphrase stretched with PBKDF2.
    Passphrase,
    /// The built-in development fallback.
    DevelopmentFallback,
    /// Freshly generated in-process.
    Generated,
}

/// The 256-bit AES-GCM key shared by every vault operation in the process.
#[derive(Clone)]
pub struct MasterKey {
    bytes: [u8; KEY_LEN],
    source: KeySource,
}

impl MasterKey {
    /// Wrap raw key bytes.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Config`] unless `bytes` is exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|_| VaultError::Config {
            reason: format!("encryption key must be {KEY_LEN} bytes, got {}", bytes.len()),
        })?;
        Ok(Self {
            bytes,
            source: KeySource::Raw,
        })
    }

    /// Stretch a passphrase into a key.
    pub fn from_passphrase(passphrase: &str) -> Self {
        let mut bytes = [0u8; KEY_LEN];
        crypto::derive_key_with_salt(passphrase.as_bytes(), APP_SALT, &mut bytes);
        Self {
            bytes,
            source: KeySource::Passphrase,
        }
    }

    /// Generate a random key.
    pub fn generate() -> Result<Self> {
        let random = crypto::random_bytes(KEY_LEN)?;
        let mut key = Self::from_bytes(&random)?;
        key.source = KeySource::Generated;
        Ok(key)
    }

    /// Interpret a configured value per the module-level table.
    pub fn from_config_value(value: Option<&str>) -> Self {
        let value = value.map(str::trim).filter(|v| !v.is_empty());

        let Some(value) = value else {
            tracing::warn!(
                env = ENCRYPTION_KEY_ENV,
                "no encryption key configured, using the DEVELOPMENT fallback key; \
                 credentials are NOT protected"
            );
            let mut key = Self::from_passphrase(DEVELOPMENT_FALLBACK_KEY);
            key.source = KeySource::DevelopmentFallback;
            return key;
        };

        if let Ok(decoded) = STANDARD.decode(value)
            && decoded.len() == KEY_LEN
            && let Ok(key) = Self::from_bytes(&decoded)
        {
            tracing::debug!("using raw encryption key");
            return key;
        }

        tracing::debug!("deriving encryption key from passphrase");
        Self::from_passphrase(value)
    }

    /// Read `ENCRYPTION_KEY` from the process environment.
    pub fn from_env() -> Self {
        let value = std::env::var(ENCRYPTION_KEY_ENV).ok();
        Self::from_config_value(value.as_deref())
    }

    /// Export as base64, the format accepted by [`from_config_value`](Self::from_config_value).
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.bytes)
    }

    pub fn source(&self) -> KeySource {
        self.source
    }

    pub fn is_development_fallback(&self) -> bool {
        self.source == KeySource::DevelopmentFallback
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterKey")
            .field("bytes", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}
