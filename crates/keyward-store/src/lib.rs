//! # keyward-store
//!
//! Session-scoped key/value persistence for keyward.
//!
//! Everything above this crate talks to storage through the
//! [`KeyValueStore`] trait: `set` with a TTL, `get`, `delete`, all
//! idempotent, with expired entries reading as absent. Two adapters ship:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  KeyValueStore (async trait)                 │
//! ├──────────────────────┬───────────────────────┤
//! │  SqliteSessionStore  │  MemoryStore          │
//! │  (rusqlite WAL,      │  (DashMap, lazy       │
//! │   per-session rows)  │   eviction)           │
//! └──────────────────────┴───────────────────────┘
//! ```
//!
//! Time comes from an injected [`Clock`] so expiry is testable without
//! sleeping.
//!
//! ## Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use keyward_store::{KeyValueStore, SqliteSessionStore, SystemClock};
//!
//! let store = SqliteSessionStore::open("data/keyward.db", "default", Arc::new(SystemClock))?;
//! store.set("greeting", "hello", std::time::Duration::from_secs(60)).await?;
//! ```

pub mod clock;
pub mod db;
pub mod error;
pub mod kv;
pub mod memory;
pub mod sqlite;

// ── re-exports ───────────────────────────────────────────────────────

pub use clock::{Clock, ManualClock, SystemClock};
pub use db::Database;
pub use error::{StoreError, StoreResult};
pub use kv::KeyValueStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteSessionStore;
