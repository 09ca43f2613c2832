//! The scoped key/value contract every storage adapter implements.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreResult;

/// Scoped persistence with per-entry expiry.
///
/// All three operations are idempotent. An entry whose TTL has elapsed is
/// indistinguishable from an absent one: `get` returns `None` and evicts it.
/// Operations on one key never affect another.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Store `value` under `key`, replacing any previous value. The entry
    /// expires `ttl` after the write.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Fetch the live value under `key`.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> StoreResult<()>;
}

/// Reject keys no adapter should accept.
pub(crate) fn validate_key(key: &str) -> StoreResult<()> {
    if key.is_empty() {
        return Err(crate::error::StoreError::InvalidArgument(
            "key must not be empty".into(),
        ));
    }
    Ok(())
}
