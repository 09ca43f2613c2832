//! Integration tests for the keyward-vault crate.
//!
//! These drive a full [`CredentialVault`] over real store adapters with a
//! manual clock: round trips, tampering, expiry, lockout, rate limiting,
//! removal, isolation and concurrency.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use keyward_store::{
    Clock, KeyValueStore, ManualClock, MemoryStore, SqliteSessionStore, StoreError, StoreResult,
};
use keyward_vault::{
    AbuseGuard, CredentialVault, GuardConfig, MasterKey, RateLimiter, VaultConfig, VaultError,
};

const T0: i64 = 1_700_000_000_000;

/// A store that can be switched into failure mode.
#[derive(Clone)]
struct FlakyStore {
    inner: MemoryStore,
    fail_writes: Arc<AtomicBool>,
    fail_expiry_writes: Arc<AtomicBool>,
    fail_reads: Arc<AtomicBool>,
}

impl FlakyStore {
    fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: MemoryStore::new(clock),
            fail_writes: Arc::new(AtomicBool::new(false)),
            fail_expiry_writes: Arc::new(AtomicBool::new(false)),
            fail_reads: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("disk full".into()));
        }
        if key.ends_with("_expiry") && self.fail_expiry_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("disk full".into()));
        }
        self.inner.set(key, value, ttl).await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection lost".into()));
        }
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.inner.delete(key).await
    }
}

struct Harness {
    vault: CredentialVault,
    clock: Arc<ManualClock>,
}

fn harness_with(store: Arc<dyn KeyValueStore>, clock: Arc<ManualClock>) -> Harness {
    let config = VaultConfig::default();
    let guard = Arc::new(AbuseGuard::new(GuardConfig::from(&config), clock.clone()));
    let vault = CredentialVault::new(
        store,
        guard,
        MasterKey::generate().unwrap(),
        clock.clone(),
        config,
    );
    Harness { vault, clock }
}

fn memory_harness() -> (Harness, MemoryStore) {
    let clock = Arc::new(ManualClock::new(T0));
    let store = MemoryStore::new(clock.clone());
    (harness_with(Arc::new(store.clone()), clock), store)
}

fn flaky_harness() -> (Harness, FlakyStore) {
    let clock = Arc::new(ManualClock::new(T0));
    let store = FlakyStore::new(clock.clone());
    (harness_with(Arc::new(store.clone()), clock), store)
}

// ═══════════════════════════════════════════════════════════════════════
//  Credential lifecycle
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn round_trip_within_lifetime() {
    let (h, _) = memory_harness();
    let long = "x".repeat(4096);
    for secret in ["sk-test-12345", "ключ-🔑", long.as_str()] {
        h.vault.set_credential("openai", secret).await.unwrap();
        assert_eq!(h.vault.get_credential("openai").await.as_deref(), Some(secret));
    }
}

#[tokio::test]
async fn tampered_ciphertext_reads_as_absent_and_is_purged() {
    let (h, store) = memory_harness();
    h.vault.set_credential("openai", "sk-tamper").await.unwrap();

    let stored = store.get("openai_api_key").await.unwrap().unwrap();
    // Swap one base64 digit in the middle of the payload.
    let mid = stored.len() / 2;
    let replacement = if &stored[mid..=mid] == "Q" { "R" } else { "Q" };
    let tampered = format!("{}{}{}", &stored[..mid], replacement, &stored[mid + 1..]);
    store
        .set("openai_api_key", &tampered, Duration::from_secs(3600))
        .await
        .unwrap();

    assert_eq!(h.vault.get_credential("openai").await, None);
    assert!(!store.contains_raw("openai_api_key"));
    assert!(!store.contains_raw("openai_expiry"));
}

#[tokio::test]
async fn record_from_another_key_is_rejected() {
    let clock = Arc::new(ManualClock::new(T0));
    let store = MemoryStore::new(clock.clone());
    let writer = harness_with(Arc::new(store.clone()), clock.clone());
    let reader = harness_with(Arc::new(store.clone()), clock);

    writer.vault.set_credential("openai", "sk").await.unwrap();
    assert_eq!(reader.vault.get_credential("openai").await, None);
    assert!(store.is_empty());
}

#[tokio::test]
async fn expiry_is_exact() {
    let (h, store) = memory_harness();
    h.vault.set_credential("openai", "sk-expiring").await.unwrap();
    let lifetime = h.vault.config().session_lifetime;

    h.clock.set(T0 + lifetime.as_millis() as i64 - 1);
    assert_eq!(
        h.vault.get_credential("openai").await.as_deref(),
        Some("sk-expiring")
    );

    h.clock.set(T0 + lifetime.as_millis() as i64);
    assert_eq!(h.vault.get_credential("openai").await, None);
    assert!(!store.contains_raw("openai_api_key"));
    assert!(!store.contains_raw("openai_expiry"));
}

#[tokio::test]
async fn remove_is_idempotent() {
    let (h, store) = memory_harness();
    h.vault.set_credential("openai", "sk").await.unwrap();

    h.vault.remove_credential("openai").await.unwrap();
    assert_eq!(h.vault.get_credential("openai").await, None);
    h.vault.remove_credential("openai").await.unwrap();
    h.vault.remove_credential("never-set").await.unwrap();
    assert!(store.is_empty());
}

#[tokio::test]
async fn providers_are_isolated() {
    let (h, _) = memory_harness();
    h.vault.set_credential("openai", "sk-a").await.unwrap();
    h.vault.set_credential("anthropic", "sk-b").await.unwrap();

    h.vault.remove_credential("openai").await.unwrap();
    assert_eq!(
        h.vault.get_credential("anthropic").await.as_deref(),
        Some("sk-b")
    );

    for _ in 0..60 {
        assert!(h.vault.guard().can_proceed("openai"));
    }
    assert!(!h.vault.guard().can_proceed("openai"));
    assert!(h.vault.guard().can_proceed("anthropic"));
}

// ═══════════════════════════════════════════════════════════════════════
//  Abuse guard
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn rate_limit_window() {
    let clock = Arc::new(ManualClock::new(T0));
    let limiter = RateLimiter::new(60, Duration::from_secs(60), clock.clone());

    for i in 0..60 {
        clock.set(T0 + i * 100);
        assert!(limiter.check_and_record("openai"), "call {i} should pass");
    }
    assert!(!limiter.check_and_record("openai"));

    clock.set(T0 + 60_000);
    assert!(limiter.check_and_record("openai"));
}

#[test]
fn rate_limit_burst_expires_all_at_once() {
    let clock = Arc::new(ManualClock::new(T0));
    let limiter = RateLimiter::new(60, Duration::from_secs(60), clock.clone());

    for i in 0..60 {
        assert!(limiter.check_and_record("openai"), "call {i} should pass");
    }
    assert!(!limiter.check_and_record("openai"));

    clock.set(T0 + 59_999);
    assert!(!limiter.check_and_record("openai"));

    clock.set(T0 + 60_000);
    assert!(limiter.check_and_record("openai"));
    assert_eq!(limiter.remaining("openai"), 59);
}

#[tokio::test]
async fn failed_overwrite_keeps_previous_credential() {
    let (h, store) = flaky_harness();
    h.vault.set_credential("openai", "sk-old").await.unwrap();

    store.fail_writes.store(true, Ordering::SeqCst);
    assert!(matches!(
        h.vault.set_credential("openai", "sk-new").await,
        Err(VaultError::Storage(_))
    ));
    store.fail_writes.store(false, Ordering::SeqCst);

    assert_eq!(
        h.vault.get_credential("openai").await.as_deref(),
        Some("sk-old")
    );
    assert_eq!(h.vault.guard().failure_count("openai"), 1);
}

#[tokio::test]
async fn half_written_overwrite_is_cleared() {
    let (h, store) = flaky_harness();
    h.vault.set_credential("openai", "sk-old").await.unwrap();

    store.fail_expiry_writes.store(true, Ordering::SeqCst);
    assert!(matches!(
        h.vault.set_credential("openai", "sk-new").await,
        Err(VaultError::Storage(_))
    ));

    // The new ciphertext never pairs with the old expiry.
    assert!(!store.inner.contains_raw("openai_api_key"));
    assert!(!store.inner.contains_raw("openai_expiry"));
    assert_eq!(h.vault.get_credential("openai").await, None);
}

#[tokio::test]
async fn lockout_after_failed_writes() {
    let (h, store) = flaky_harness();
    store.fail_writes.store(true, Ordering::SeqCst);

    for _ in 0..5 {
        assert!(matches!(
            h.vault.set_credential("openai", "sk").await,
            Err(VaultError::Storage(_))
        ));
    }
    assert_eq!(h.vault.guard().failure_count("openai"), 5);

    store.fail_writes.store(false, Ordering::SeqCst);
    match h.vault.set_credential("openai", "sk").await {
        Err(VaultError::Locked { retry_after, .. }) => {
            assert_eq!(retry_after, Duration::from_secs(15 * 60));
        }
        other => panic!("expected Locked, got {other:?}"),
    }
    // Rejected writes never reach the store.
    assert!(store.inner.is_empty());
    // ...and do not extend the lockout.
    assert_eq!(h.vault.guard().failure_count("openai"), 5);

    h.clock.advance(Duration::from_secs(15 * 60));
    h.vault.set_credential("openai", "sk").await.unwrap();
    assert_eq!(h.vault.guard().failure_count("openai"), 0);
    assert!(h.vault.guard().lockout().record("openai").is_none());
}

#[tokio::test]
async fn lockout_is_per_provider() {
    let (h, store) = flaky_harness();
    store.fail_writes.store(true, Ordering::SeqCst);
    for _ in 0..5 {
        let _ = h.vault.set_credential("openai", "sk").await;
    }
    store.fail_writes.store(false, Ordering::SeqCst);

    h.vault.set_credential("anthropic", "sk").await.unwrap();
    assert!(!h.vault.guard().is_open("openai"));
}

#[tokio::test]
async fn storage_failure_on_read_is_fail_safe() {
    let (h, store) = flaky_harness();
    h.vault.set_credential("openai", "sk").await.unwrap();

    store.fail_reads.store(true, Ordering::SeqCst);
    assert_eq!(h.vault.get_credential("openai").await, None);
    // The record is not purged on a transient read failure.
    assert!(store.inner.contains_raw("openai_api_key"));

    store.fail_reads.store(false, Ordering::SeqCst);
    assert_eq!(h.vault.get_credential("openai").await.as_deref(), Some("sk"));
}

#[test]
fn concurrent_rate_limit_never_overshoots() {
    let clock = Arc::new(ManualClock::new(T0));
    let limiter = RateLimiter::new(60, Duration::from_secs(60), clock);
    let allowed = AtomicUsize::new(0);

    std::thread::scope(|s| {
        for _ in 0..16 {
            s.spawn(|| {
                for _ in 0..20 {
                    if limiter.check_and_record("openai") {
                        allowed.fetch_add(1, Ordering::SeqCst);
                    }
                }
            });
        }
    });

    assert_eq!(allowed.load(Ordering::SeqCst), 60);
}

// ═══════════════════════════════════════════════════════════════════════
//  Write ordering
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn newest_write_wins() {
    let (h, _) = memory_harness();
    let slow = h.vault.begin_write("openai").unwrap();
    let fast = h.vault.begin_write("openai").unwrap();
    assert!(fast.generation() > slow.generation());

    h.vault.commit_write(fast, "sk-new").await.unwrap();
    assert!(matches!(
        h.vault.commit_write(slow, "sk-old").await,
        Err(VaultError::Superseded { .. })
    ));
    assert_eq!(
        h.vault.get_credential("openai").await.as_deref(),
        Some("sk-new")
    );
    assert_eq!(h.vault.guard().failure_count("openai"), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writes_leave_one_consistent_record() {
    let (h, _) = memory_harness();
    let vault = Arc::new(h.vault);

    let mut tasks = Vec::new();
    for i in 0..8 {
        let vault = Arc::clone(&vault);
        tasks.push(tokio::spawn(async move {
            vault.set_credential("openai", &format!("sk-{i}")).await
        }));
    }
    for task in tasks {
        match task.await.unwrap() {
            Ok(()) | Err(VaultError::Superseded { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    let value = vault.get_credential("openai").await.unwrap();
    assert!(value.starts_with("sk-"));
}

// ═══════════════════════════════════════════════════════════════════════
//  SQLite adapter
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn credentials_survive_reopen_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vault.db");
    let clock = Arc::new(ManualClock::new(T0));
    let key = MasterKey::generate().unwrap();
    let config = VaultConfig::default();

    let open = |key: MasterKey| {
        let store = SqliteSessionStore::open(&path, "session-a", clock.clone()).unwrap();
        let guard = Arc::new(AbuseGuard::new(GuardConfig::from(&config), clock.clone()));
        CredentialVault::new(Arc::new(store), guard, key, clock.clone(), config.clone())
    };

    open(key.clone())
        .set_credential("openai", "sk-disk")
        .await
        .unwrap();

    let reopened = open(key);
    assert_eq!(
        reopened.get_credential("openai").await.as_deref(),
        Some("sk-disk")
    );

    clock.advance(config.session_lifetime);
    assert_eq!(reopened.get_credential("openai").await, None);
}
