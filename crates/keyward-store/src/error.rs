//! Error types for the keyward-store crate.
//!
//! Every adapter returns [`StoreError`] via [`StoreResult`]. Callers that
//! only care whether persistence worked can treat every variant the same.

use thiserror::Error;

/// Alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in a key/value store adapter.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite operation failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A blocking task was cancelled or panicked, or a lock was poisoned.
    #[error("background task failed: {0}")]
    TaskJoin(String),

    /// An invalid argument was provided to a store operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The backing storage cannot be reached at all.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(err.to_string())
    }
}
