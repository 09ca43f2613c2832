//! On-storage layout of an encrypted credential.
//!
//! Two entries per provider live in the session store:
//!
//! ```text
//! {provider}_api_key  ->  "v1." + base64(nonce[12] || ciphertext || tag[16])
//! {provider}_expiry   ->  epoch milliseconds, decimal
//! ```
//!
//! The `v1.` prefix versions the format. Anything that does not parse as the
//! current version is reported as [`VaultError::Integrity`] and the caller
//! purges it; old formats are never migrated.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::crypto::{NONCE_LEN_BYTES, TAG_LEN};
use crate::error::{Result, VaultError};

/// Prefix of the current record format.
pub const FORMAT_V1: &str = "v1.";

/// Longest accepted provider identifier, in bytes.
pub const MAX_PROVIDER_LEN: usize = 64;

/// An encrypted credential as persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedRecord {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN_BYTES],
    /// Epoch milliseconds after which the record is dead.
    pub expires_at: i64,
}

impl EncryptedRecord {
    /// Encode the ciphertext entry value.
    pub fn encode_secret(&self) -> String {
        let mut payload = Vec::with_capacity(NONCE_LEN_BYTES + self.ciphertext.len());
        payload.extend_from_slice(&self.nonce);
        payload.extend_from_slice(&self.ciphertext);
        format!("{FORMAT_V1}{}", STANDARD.encode(payload))
    }

    /// Encode the expiry entry value.
    pub fn encode_expiry(&self) -> String {
        self.expires_at.to_string()
    }

    /// Rebuild a record from the two stored entry values.
    pub fn decode(secret: &str, expiry: &str) -> Result<Self> {
        let expires_at = expiry
            .trim()
            .parse::<i64>()
            .map_err(|_| integrity("expiry entry is not an integer"))?;

        let encoded = secret
            .strip_prefix(FORMAT_V1)
            .ok_or_else(|| integrity("unsupported record format"))?;
        let payload = STANDARD
            .decode(encoded)
            .map_err(|_| integrity("record payload is not valid base64"))?;

        if payload.len() < NONCE_LEN_BYTES + TAG_LEN {
            return Err(integrity("record payload is truncated"));
        }

        let (nonce, ciphertext) = payload.split_at(NONCE_LEN_BYTES);
        let mut nonce_bytes = [0u8; NONCE_LEN_BYTES];
        nonce_bytes.copy_from_slice(nonce);

        Ok(Self {
            ciphertext: ciphertext.to_vec(),
            nonce: nonce_bytes,
            expires_at,
        })
    }

    /// Whether the record is dead at `now_ms`.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at
    }
}

fn integrity(reason: &str) -> VaultError {
    VaultError::Integrity {
        reason: reason.to_string(),
    }
}

/// Storage key of the ciphertext entry.
pub fn secret_entry(provider: &str) -> String {
    format!("{provider}_api_key")
}

/// Storage key of the expiry entry.
pub fn expiry_entry(provider: &str) -> String {
    format!("{provider}_expiry")
}

/// Check that `provider` is safe to embed in storage keys.
///
/// Accepts 1 to [`MAX_PROVIDER_LEN`] ASCII alphanumerics, `-`, `_` or `.`.
pub fn validate_provider(provider: &str) -> Result<()> {
    if provider.is_empty() {
        return Err(VaultError::validation("provider must not be empty"));
    }
    if provider.len() > MAX_PROVIDER_LEN {
        return Err(VaultError::validation(format!(
            "provider must be at most {MAX_PROVIDER_LEN} characters"
        )));
    }
    if !provider
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
    {
        return Err(VaultError::validation(
            "provider may only contain letters, digits, '-', '_' and '.'",
        ));
    }
    Ok(())
}
