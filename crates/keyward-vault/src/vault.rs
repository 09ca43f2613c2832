//! Session credential vault.
//!
//! [`CredentialVault`] encrypts on write, decrypts on read, and purges
//! records that expired, were removed, or can no longer be authenticated.
//! Plaintext never reaches the store and never appears in logs.
//!
//! # Write ordering
//!
//! Within one provider, the newest write wins. [`CredentialVault::begin_write`]
//! hands out a [`WriteTicket`] carrying a per-provider generation number.
//! A collaborator that validates the key over the network first holds the
//! ticket across that round trip, then calls
//! [`CredentialVault::commit_write`]. If a newer ticket was issued (or the
//! credential was removed) in the meantime, the commit returns
//! [`VaultError::Superseded`] and changes nothing, not even the lockout
//! counter. Commits for one provider are serialised by an async mutex so the
//! generation check and the storage writes form one step.
//!
//! # Failure semantics
//!
//! | Operation | Storage error               | Integrity error          |
//! |-----------|-----------------------------|--------------------------|
//! | set       | returned, counts as failure | n/a                      |
//! | get       | logged, reads as `None`     | record purged, `None`    |
//! | remove    | returned                    | n/a                      |

use std::sync::Arc;

use dashmap::DashMap;
use keyward_store::clock::duration_ms;
use keyward_store::{Clock, KeyValueStore};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, instrument, warn};

use crate::config::VaultConfig;
use crate::crypto;
use crate::error::{Result, VaultError};
use crate::guard::AbuseGuard;
use crate::key::MasterKey;
use crate::record::{self, EncryptedRecord};

/// Claim on the next write for one provider. See the module docs.
#[derive(Debug)]
#[must_use = "a ticket does nothing until committed"]
pub struct WriteTicket {
    provider: String,
    generation: u64,
}

impl WriteTicket {
    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Encrypted, expiring, per-provider credential storage.
pub struct CredentialVault {
    store: Arc<dyn KeyValueStore>,
    guard: Arc<AbuseGuard>,
    key: MasterKey,
    clock: Arc<dyn Clock>,
    config: VaultConfig,
    generations: DashMap<String, u64>,
    write_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl CredentialVault {
    /// Assemble a vault. The guard is shared so collaborators can consult
    /// the same rate limiter before outbound calls.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        guard: Arc<AbuseGuard>,
        key: MasterKey,
        clock: Arc<dyn Clock>,
        config: VaultConfig,
    ) -> Self {
        Self {
            store,
            guard,
            key,
            clock,
            config,
            generations: DashMap::new(),
            write_locks: DashMap::new(),
        }
    }

    pub fn guard(&self) -> &Arc<AbuseGuard> {
        &self.guard
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    // -- Writes -------------------------------------------------------------

    /// Encrypt and store `plaintext` for `provider`, replacing any previous
    /// credential.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Validation`] for an empty credential or bad provider.
    /// - [`VaultError::Locked`] while the provider is locked out; storage is
    ///   not touched.
    /// - [`VaultError::Storage`] / [`VaultError::EncryptionFailed`] when the
    ///   write fails; the failure counts toward lockout.
    /// - [`VaultError::Superseded`] if a newer write or removal overtook this
    ///   one.
    #[instrument(skip(self, plaintext))]
    pub async fn set_credential(&self, provider: &str, plaintext: &str) -> Result<()> {
        validate_secret(plaintext)?;
        let ticket = self.begin_write(provider)?;
        self.commit_write(ticket, plaintext).await
    }

    /// Claim the next write for `provider`, abandoning any earlier ticket.
    pub fn begin_write(&self, provider: &str) -> Result<WriteTicket> {
        record::validate_provider(provider)?;
        let generation = self.bump_generation(provider);
        debug!(provider, generation, "write ticket issued");
        Ok(WriteTicket {
            provider: provider.to_string(),
            generation,
        })
    }

    /// Perform the write claimed by `ticket`, unless it was superseded.
    #[instrument(skip(self, ticket, plaintext), fields(provider = %ticket.provider, generation = ticket.generation))]
    pub async fn commit_write(&self, ticket: WriteTicket, plaintext: &str) -> Result<()> {
        let provider = ticket.provider.as_str();
        validate_secret(plaintext)?;

        let _held = self.lock_provider(provider).await;

        if !self.is_current(&ticket) {
            debug!("stale write abandoned");
            return Err(VaultError::Superseded {
                provider: provider.to_string(),
            });
        }

        self.guard.ensure_open(provider)?;

        match self.write_record(provider, plaintext).await {
            Ok(expires_at) => {
                self.guard.record_success(provider);
                info!(expires_at, "credential stored");
                Ok(())
            }
            Err(err) => {
                self.guard.record_failure(provider);
                warn!(error = %err, "credential write failed");
                Err(err)
            }
        }
    }

    async fn write_record(&self, provider: &str, plaintext: &str) -> Result<i64> {
        let (nonce, ciphertext) = crypto::encrypt(plaintext, self.key.as_bytes())?;
        let lifetime = self.config.session_lifetime;
        let record = EncryptedRecord {
            ciphertext,
            nonce,
            expires_at: self
                .clock
                .now_ms()
                .saturating_add(duration_ms(lifetime).max(1)),
        };

        let secret_key = record::secret_entry(provider);
        let expiry_key = record::expiry_entry(provider);

        // Nothing has changed yet if this fails; the previous record stays.
        self.store
            .set(&secret_key, &record.encode_secret(), lifetime)
            .await?;

        if let Err(err) = self
            .store
            .set(&expiry_key, &record.encode_expiry(), lifetime)
            .await
        {
            // The new ciphertext must not pair with the old expiry.
            self.delete_entries(provider).await.unwrap_or_else(|cleanup| {
                warn!(provider, error = %cleanup, "cleanup after failed write also failed");
            });
            return Err(err.into());
        }

        Ok(record.expires_at)
    }

    // -- Reads --------------------------------------------------------------

    /// Decrypt the live credential for `provider`.
    ///
    /// Returns `None` when there is no credential, it has expired, it fails
    /// authentication, or storage is unreachable. Expired and unusable
    /// records are deleted.
    #[instrument(skip(self))]
    pub async fn get_credential(&self, provider: &str) -> Option<String> {
        if record::validate_provider(provider).is_err() {
            return None;
        }
        let generation = self.current_generation(provider);

        let record = match self.read_record(provider).await {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(VaultError::Storage(err)) => {
                warn!(error = %err, "storage unavailable, treating credential as absent");
                return None;
            }
            Err(err) => {
                warn!(error = %err, "unusable credential record");
                self.purge_if_unchanged(provider, generation).await;
                return None;
            }
        };

        if record.is_expired(self.clock.now_ms()) {
            debug!(expires_at = record.expires_at, "credential expired");
            self.purge_if_unchanged(provider, generation).await;
            return None;
        }

        match crypto::decrypt(&record.nonce, &record.ciphertext, self.key.as_bytes()) {
            Ok(plaintext) => Some(plaintext),
            Err(err) => {
                warn!(error = %err, "credential failed authentication, purging");
                self.purge_if_unchanged(provider, generation).await;
                None
            }
        }
    }

    /// Whether a live, well-formed record exists. Does not decrypt.
    pub async fn has_credential(&self, provider: &str) -> bool {
        self.expires_at(provider).await.is_some()
    }

    /// Expiry of the live record, in epoch milliseconds. Does not decrypt.
    pub async fn expires_at(&self, provider: &str) -> Option<i64> {
        if record::validate_provider(provider).is_err() {
            return None;
        }
        let now = self.clock.now_ms();
        match self.read_record(provider).await {
            Ok(Some(record)) if !record.is_expired(now) => Some(record.expires_at),
            _ => None,
        }
    }

    async fn read_record(&self, provider: &str) -> Result<Option<EncryptedRecord>> {
        let secret = self.store.get(&record::secret_entry(provider)).await?;
        let expiry = self.store.get(&record::expiry_entry(provider)).await?;

        match (secret, expiry) {
            (None, None) => Ok(None),
            (Some(secret), Some(expiry)) => EncryptedRecord::decode(&secret, &expiry).map(Some),
            _ => Err(VaultError::Integrity {
                reason: "incomplete credential record".into(),
            }),
        }
    }

    // -- Removal ------------------------------------------------------------

    /// Delete the credential for `provider`. Removing an absent credential
    /// is not an error. Any write still in flight for the provider is
    /// abandoned.
    ///
    /// # Errors
    ///
    /// [`VaultError::Validation`] for a malformed provider,
    /// [`VaultError::Storage`] if the store rejects the delete.
    #[instrument(skip(self))]
    pub async fn remove_credential(&self, provider: &str) -> Result<()> {
        record::validate_provider(provider)?;
        self.bump_generation(provider);

        let _held = self.lock_provider(provider).await;
        self.delete_entries(provider).await?;
        info!("credential removed");
        Ok(())
    }

    async fn delete_entries(&self, provider: &str) -> Result<()> {
        self.store.delete(&record::secret_entry(provider)).await?;
        self.store.delete(&record::expiry_entry(provider)).await?;
        Ok(())
    }

    /// Delete a stale record, unless a write or removal happened since
    /// `seen_generation` was read.
    async fn purge_if_unchanged(&self, provider: &str, seen_generation: u64) {
        let _held = self.lock_provider(provider).await;

        if self.current_generation(provider) != seen_generation {
            debug!(provider, "record changed concurrently, skipping purge");
            return;
        }
        if let Err(err) = self.delete_entries(provider).await {
            warn!(provider, error = %err, "failed to purge stale credential");
        }
    }

    // -- Generations --------------------------------------------------------

    fn bump_generation(&self, provider: &str) -> u64 {
        let mut generation = self.generations.entry(provider.to_string()).or_insert(0);
        *generation += 1;
        *generation
    }

    fn current_generation(&self, provider: &str) -> u64 {
        self.generations.get(provider).map(|g| *g).unwrap_or(0)
    }

    fn is_current(&self, ticket: &WriteTicket) -> bool {
        self.current_generation(&ticket.provider) == ticket.generation
    }

    async fn lock_provider(&self, provider: &str) -> ProviderLock<'_> {
        let lock = Arc::clone(&self.write_locks.entry(provider.to_string()).or_default());
        ProviderLock {
            guard: Some(lock.lock_owned().await),
            provider: provider.to_string(),
            locks: &self.write_locks,
        }
    }
}

/// Holds a provider's write lock; drops the map entry once nobody else
/// holds or waits on it.
struct ProviderLock<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    provider: String,
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
}

impl Drop for ProviderLock<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .remove_if(&self.provider, |_, lock| Arc::strong_count(lock) == 1);
    }
}

fn validate_secret(plaintext: &str) -> Result<()> {
    if plaintext.trim().is_empty() {
        return Err(VaultError::validation("API key must not be empty"));
    }
    Ok(())
}
