//! AES-256-GCM encryption and decryption using the `ring` crate.
//!
//! - **Encryption/decryption**: AES-256-GCM with a fresh random 96-bit nonce
//!   per call. The 128-bit tag is appended to the ciphertext, so integrity is
//!   verified on every decrypt.
//! - **Key stretching**: PBKDF2-HMAC-SHA256 for passphrase-style keys.
//! - **Random generation**: `ring`'s system CSPRNG.
//!
//! # Security Notes
//!
//! One process-wide key seals many credentials, so nonce uniqueness per
//! call is a hard requirement. With random 96-bit nonces the collision
//! probability stays negligible for up to ~2^32 encryptions under one key,
//! far beyond a session's worth of credential writes.

use std::num::NonZeroU32;

use ring::aead::{self, Aad, BoundKey, NONCE_LEN, Nonce, NonceSequence, SealingKey, UnboundKey};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{Result, VaultError};

/// Length of the AES-256-GCM key in bytes.
pub const KEY_LEN: usize = 32;

/// Length of the AES-256-GCM nonce in bytes (96 bits).
pub const NONCE_LEN_BYTES: usize = NONCE_LEN;

/// Length of the GCM authentication tag appended to every ciphertext.
pub const TAG_LEN: usize = 16;

/// PBKDF2 iteration count, per OWASP 2023 guidance for HMAC-SHA256.
const PBKDF2_ITERATIONS: NonZeroU32 = NonZeroU32::new(600_000).unwrap();

static PBKDF2_ALG: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

static AEAD_ALG: &aead::Algorithm = &aead::AES_256_GCM;

// ---------------------------------------------------------------------------
// Nonce handling
// ---------------------------------------------------------------------------

/// Yields exactly one nonce, then errors. Binds each sealing/opening key to a
/// single operation.
struct SingleNonce(Option<[u8; NONCE_LEN_BYTES]>);

impl SingleNonce {
    fn new(bytes: [u8; NONCE_LEN_BYTES]) -> Self {
        Self(Some(bytes))
    }
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.0
            .take()
            .map(Nonce::assume_unique_for_key)
            .ok_or(ring::error::Unspecified)
    }
}

// ---------------------------------------------------------------------------
// Encryption
// ---------------------------------------------------------------------------

/// Encrypt a credential with AES-256-GCM under the 256-bit `key`.
///
/// Returns `(nonce, ciphertext)`; `ciphertext` carries the tag.
///
/// # Errors
///
/// Returns [`VaultError::EncryptionFailed`] if the key length is wrong, the
/// CSPRNG fails, or `ring` rejects the operation.
pub fn encrypt(plaintext: &str, key: &[u8]) -> Result<([u8; NONCE_LEN_BYTES], Vec<u8>)> {
    if key.len() != KEY_LEN {
        return Err(VaultError::EncryptionFailed {
            reason: format!("key must be {} bytes, got {}", KEY_LEN, key.len()),
        });
    }

    let mut nonce_bytes = [0u8; NONCE_LEN_BYTES];
    SystemRandom::new()
        .fill(&mut nonce_bytes)
        .map_err(|_| VaultError::EncryptionFailed {
            reason: "failed to generate random nonce".into(),
        })?;

    let unbound_key = UnboundKey::new(AEAD_ALG, key).map_err(|_| VaultError::EncryptionFailed {
        reason: "failed to create AES-256-GCM key".into(),
    })?;
    let mut sealing_key = SealingKey::new(unbound_key, SingleNonce::new(nonce_bytes));

    let mut in_out = plaintext.as_bytes().to_vec();
    sealing_key
        .seal_in_place_append_tag(Aad::empty(), &mut in_out)
        .map_err(|_| VaultError::EncryptionFailed {
            reason: "seal_in_place failed".into(),
        })?;

    tracing::trace!(ciphertext_len = in_out.len(), "sealed credential");

    Ok((nonce_bytes, in_out))
}

/// Decrypt and authenticate `ciphertext` (tag included).
///
/// # Errors
///
/// Returns [`VaultError::Integrity`] if the key is wrong, the nonce or
/// ciphertext was altered, or the recovered bytes are not UTF-8. Never
/// returns unauthenticated plaintext.
pub fn decrypt(nonce: &[u8; NONCE_LEN_BYTES], ciphertext: &[u8], key: &[u8]) -> Result<String> {
    if key.len() != KEY_LEN {
        return Err(VaultError::Integrity {
            reason: format!("key must be {} bytes, got {}", KEY_LEN, key.len()),
        });
    }

    let unbound_key = UnboundKey::new(AEAD_ALG, key).map_err(|_| VaultError::Integrity {
        reason: "failed to create AES-256-GCM key".into(),
    })?;
    let mut opening_key = aead::OpeningKey::new(unbound_key, SingleNonce::new(*nonce));

    let mut in_out = ciphertext.to_vec();
    let plaintext = opening_key
        .open_in_place(Aad::empty(), &mut in_out)
        .map_err(|_| VaultError::Integrity {
            reason: "authentication failed, wrong key or altered data".into(),
        })?;

    let text = String::from_utf8(plaintext.to_vec()).map_err(|_| VaultError::Integrity {
        reason: "decrypted credential is not valid UTF-8".into(),
    })?;

    tracing::trace!(ciphertext_len = ciphertext.len(), "opened credential");
    Ok(text)
}

// ---------------------------------------------------------------------------
// Key derivation
// ---------------------------------------------------------------------------

/// Derive a 256-bit key from `password` and a known `salt` with
/// PBKDF2-HMAC-SHA256.
pub fn derive_key_with_salt(password: &[u8], salt: &[u8], out: &mut [u8; KEY_LEN]) {
    pbkdf2::derive(PBKDF2_ALG, PBKDF2_ITERATIONS, salt, password, out);
}

// ---------------------------------------------------------------------------
// Random bytes
// ---------------------------------------------------------------------------

/// Generate `len` cryptographically secure random bytes.
///
/// # Errors
///
/// Returns [`VaultError::Internal`] if the system CSPRNG fails.
pub fn random_bytes(len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    SystemRandom::new()
        .fill(&mut buf)
        .map_err(|_| VaultError::Internal("failed to generate random bytes".into()))?;
    Ok(buf)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> Vec<u8> {
        random_bytes(KEY_LEN).unwrap()
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = key();
        let long = "x".repeat(4096);
        for plaintext in ["sk-test-api-key", "ş🔑 ünïcode", long.as_str()] {
            let (nonce, ciphertext) = encrypt(plaintext, &key).unwrap();
            assert_eq!(ciphertext.len(), plaintext.len() + TAG_LEN);
            assert_eq!(decrypt(&nonce, &ciphertext, &key).unwrap(), plaintext);
        }
    }

    #[test]
    fn nonces_are_fresh_per_call() {
        let key = key();
        let (n1, c1) = encrypt("same input", &key).unwrap();
        let (n2, c2) = encrypt("same input", &key).unwrap();
        assert_ne!(n1, n2);
        assert_ne!(c1, c2);
    }

    #[test]
    fn decrypt_with_wrong_key_is_integrity_error() {
        let (nonce, ciphertext) = encrypt("secret", &key()).unwrap();
        let result = decrypt(&nonce, &ciphertext, &key());
        assert!(matches!(result, Err(VaultError::Integrity { .. })));
    }

    #[test]
    fn every_single_bit_flip_is_detected() {
        let key = key();
        let (nonce, ciphertext) = encrypt("sk-abc", &key).unwrap();

        for byte in 0..ciphertext.len() {
            for bit in 0..8 {
                let mut tampered = ciphertext.clone();
                tampered[byte] ^= 1 << bit;
                assert!(
                    matches!(
                        decrypt(&nonce, &tampered, &key),
                        Err(VaultError::Integrity { .. })
                    ),
                    "ciphertext flip at byte {byte} bit {bit} went undetected"
                );
            }
        }

        for byte in 0..NONCE_LEN_BYTES {
            for bit in 0..8 {
                let mut tampered = nonce;
                tampered[byte] ^= 1 << bit;
                assert!(
                    matches!(
                        decrypt(&tampered, &ciphertext, &key),
                        Err(VaultError::Integrity { .. })
                    ),
                    "nonce flip at byte {byte} bit {bit} went undetected"
                );
            }
        }
    }

    #[test]
    fn truncated_ciphertext_rejected() {
        let key = key();
        let (nonce, ciphertext) = encrypt("sk-abc", &key).unwrap();
        let result = decrypt(&nonce, &ciphertext[..TAG_LEN - 1], &key);
        assert!(matches!(result, Err(VaultError::Integrity { .. })));
    }

    #[test]
    fn invalid_key_length_rejected() {
        let short_key = vec![0u8; 16];
        assert!(matches!(
            encrypt("test", &short_key),
            Err(VaultError::EncryptionFailed { .. })
        ));
    }

    #[test]
    fn pbkdf2_deterministic_with_same_salt() {
        let mut a = [0u8; KEY_LEN];
        let mut b = [0u8; KEY_LEN];
        derive_key_with_salt(b"passphrase", b"salt-salt-salt-salt", &mut a);
        derive_key_with_salt(b"passphrase", b"salt-salt-salt-salt", &mut b);
        assert_eq!(a, b);

        let mut c = [0u8; KEY_LEN];
        derive_key_with_salt(b"other", b"salt-salt-salt-salt", &mut c);
        assert_ne!(a, c);
    }
}
