//! SQLite-backed, session-scoped key/value store.
//!
//! This is the production adapter. Every entry belongs to exactly one
//! session identifier; a store handle only ever sees its own session's rows.
//! When the session ends, [`SqliteSessionStore::end_session`] wipes the
//! whole scope.
//!
//! # Schema
//!
//! ```text
//! session_entries(session_id, key, value, expires_at)  -- PK (session_id, key)
//! ```
//!
//! `expires_at` is epoch milliseconds taken from the injected [`Clock`].

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{OptionalExtension, params};
use tracing::{debug, info, instrument};

use crate::clock::{Clock, duration_ms};
use crate::db::Database;
use crate::error::{StoreError, StoreResult};
use crate::kv::{KeyValueStore, validate_key};

/// Key/value store persisted in SQLite and scoped to one session.
#[derive(Clone)]
pub struct SqliteSessionStore {
    db: Database,
    session_id: Arc<str>,
    clock: Arc<dyn Clock>,
}

impl SqliteSessionStore {
    /// Open the database at `path` and scope the handle to `session_id`.
    pub fn open(
        path: impl AsRef<Path>,
        session_id: &str,
        clock: Arc<dyn Clock>,
    ) -> StoreResult<Self> {
        Self::validate_session(session_id)?;
        let db = Database::open(path)?;
        info!(session = session_id, "session store ready");
        Ok(Self::with_database(db, session_id, clock))
    }

    /// In-memory variant, mainly for tests.
    pub fn open_in_memory(session_id: &str, clock: Arc<dyn Clock>) -> StoreResult<Self> {
        Self::validate_session(session_id)?;
        let db = Database::open_in_memory()?;
        Ok(Self::with_database(db, session_id, clock))
    }

    /// Scope an existing database handle to another session. Both handles
    /// share the connection but never each other's rows.
    pub fn scoped(&self, session_id: &str) -> StoreResult<Self> {
        Self::validate_session(session_id)?;
        Ok(Self::with_database(
            self.db.clone(),
            session_id,
            Arc::clone(&self.clock),
        ))
    }

    fn with_database(db: Database, session_id: &str, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            session_id: Arc::from(session_id),
            clock,
        }
    }

    fn validate_session(session_id: &str) -> StoreResult<()> {
        if session_id.trim().is_empty() {
            return Err(StoreError::InvalidArgument(
                "session id must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// The session this handle is scoped to.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Delete every entry in this session. Returns the number removed.
    #[instrument(skip(self), fields(session = %self.session_id))]
    pub async fn end_session(&self) -> StoreResult<usize> {
        let session = Arc::clone(&self.session_id);
        let removed = self
            .db
            .execute(move |conn| {
                Ok(conn.execute(
                    "DELETE FROM session_entries WHERE session_id = ?1",
                    params![&*session],
                )?)
            })
            .await?;
        info!(removed, "session ended");
        Ok(removed)
    }

    /// Delete every expired entry in this session. Returns the number removed.
    pub async fn purge_expired(&self) -> StoreResult<usize> {
        let session = Arc::clone(&self.session_id);
        let now = self.clock.now_ms();
        let removed = self
            .db
            .execute(move |conn| {
                Ok(conn.execute(
                    "DELETE FROM session_entries WHERE session_id = ?1 AND expires_at <= ?2",
                    params![&*session, now],
                )?)
            })
            .await?;
        debug!(session = %self.session_id, removed, "purged expired entries");
        Ok(removed)
    }

    /// Count rows in this session, expired or not.
    pub async fn raw_len(&self) -> StoreResult<usize> {
        let session = Arc::clone(&self.session_id);
        let count: i64 = self
            .db
            .execute(move |conn| {
                Ok(conn.query_row(
                    "SELECT count(*) FROM session_entries WHERE session_id = ?1",
                    params![&*session],
                    |row| row.get(0),
                )?)
            })
            .await?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

#[async_trait]
impl KeyValueStore for SqliteSessionStore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        validate_key(key)?;
        let session = Arc::clone(&self.session_id);
        let key = key.to_string();
        let value = value.to_string();
        let expires_at = self.clock.now_ms().saturating_add(duration_ms(ttl));

        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO session_entries (session_id, key, value, expires_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(session_id, key)
                     DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
                    params![&*session, key, value, expires_at],
                )?;
                Ok(())
            })
            .await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        validate_key(key)?;
        let session = Arc::clone(&self.session_id);
        let owned_key = key.to_string();
        let now = self.clock.now_ms();

        let (value, evicted) = self
            .db
            .execute(move |conn| {
                let row: Option<(String, i64)> = conn
                    .query_row(
                        "SELECT value, expires_at FROM session_entries
                         WHERE session_id = ?1 AND key = ?2",
                        params![&*session, owned_key],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;

                match row {
                    Some((_, expires_at)) if expires_at <= now => {
                        conn.execute(
                            "DELETE FROM session_entries
                             WHERE session_id = ?1 AND key = ?2 AND expires_at <= ?3",
                            params![&*session, owned_key, now],
                        )?;
                        Ok((None, true))
                    }
                    Some((value, _)) => Ok((Some(value), false)),
                    None => Ok((None, false)),
                }
            })
            .await?;

        if evicted {
            debug!(session = %self.session_id, key, "evicted expired entry");
        }
        Ok(value)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        validate_key(key)?;
        let session = Arc::clone(&self.session_id);
        let key = key.to_string();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "DELETE FROM session_entries WHERE session_id = ?1 AND key = ?2",
                    params![&*session, key],
                )?;
                Ok(())
            })
            .await
    }
}
