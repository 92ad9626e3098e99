//! Storage Error Types
//!
//! This module defines all error types that can occur during storage operations.
//!
//! ## Error Categories
//!
//! ### Transient (retried by the executor)
//! - `Unavailable`: Replica or coordinator unreachable
//! - `Timeout`: An attempt did not complete within its deadline
//! - `Overloaded`: No connection admitted the statement in time
//!
//! ### Terminal (surfaced immediately)
//! - `InvalidQuery`: Malformed statement, will never succeed
//! - `Unauthorized`: Credentials rejected by the cluster
//! - `CorruptBlob`: Blob properties and chunks disagree
//! - `Config`: Configuration value could not be parsed
//!
//! ### Retry outcome
//! - `RetriesExhausted`: Transient failures outlasted the retry budget
//!
//! Absent settings and absent blobs are not errors: lookups return `Option`.
//!
//! ## Usage
//!
//! All storage operations return `Result<T>` which is aliased to
//! `Result<T, StorageError>`. This allows clean error propagation with `?`.

use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Node unavailable: {0}")]
    Unavailable(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("All connections at capacity (waited {0:?})")]
    Overloaded(Duration),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: Box<StorageError>,
    },

    #[error("Corrupt blob {domain}/{key}: {reason}")]
    CorruptBlob {
        domain: String,
        key: String,
        reason: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl StorageError {
    /// Whether a repeat attempt may succeed where this one failed.
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Unavailable(_)
            | StorageError::Timeout(_)
            | StorageError::Overloaded(_) => true,
            StorageError::Database(sqlx::Error::Database(db)) => {
                db.code().as_deref().is_some_and(is_sqlite_contention)
            }
            StorageError::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::WorkerCrashed
            ),
            _ => false,
        }
    }
}

/// SQLite BUSY (5) and LOCKED (6). Extended codes keep the primary code in
/// the low byte, e.g. 261 is BUSY_RECOVERY.
fn is_sqlite_contention(code: &str) -> bool {
    code.parse::<i32>()
        .map(|code| matches!(code & 0xff, 5 | 6))
        .unwrap_or(false)
}

impl From<sqlx::migrate::MigrateError> for StorageError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        StorageError::Migration(e.to_string())
    }
}
