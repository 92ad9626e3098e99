//! HelixVault Storage Layer
//!
//! Client-side storage logic for genomic blobs and per-domain settings kept
//! in a replicated column store.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐
//! │  BlobStore   │──►│ BlobChunkPolicy  │
//! └──────┬───────┘   └────────┬─────────┘
//!        │                    ▼
//!        │           ┌──────────────────┐
//!        │           │  SettingsStore   │
//!        │           └────────┬─────────┘
//!        ▼                    ▼
//! ┌────────────────────────────────────────┐
//! │ Executor::perform                      │
//! │ - retry with backoff                   │
//! │ - consistency per attempt              │
//! │ - per-attempt deadline                 │
//! └──────────────────┬─────────────────────┘
//!                    ▼
//! ┌────────────────────────────────────────┐
//! │ ConnectionPool / Connection            │
//! │ - admission: < 512 statements in flight│
//! └──────────────────┬─────────────────────┘
//!                    ▼
//! ┌────────────────────────────────────────┐
//! │ dyn ColumnStore (memory | sqlite)      │
//! └────────────────────────────────────────┘
//! ```
//!
//! ## Main Components
//!
//! ### Executor
//! The only place retries happen. Transient failures (unavailable replicas,
//! timeouts, saturated connections) are retried with exponential backoff;
//! repeat read attempts may drop to single-replica consistency when the
//! connection allows it. Writes never do.
//!
//! ### SettingsStore
//! `(domain, name) -> value` rows. A missing setting is `Ok(None)`.
//!
//! ### BlobChunkPolicy
//! Chunk size (self-healing default of 512 KiB, floor 4 KiB) and optional
//! big-blob limit per domain.
//!
//! ### BlobStore
//! Splits payloads into chunks, writes chunks before props, and reassembles
//! them on read.
//!
//! ## Usage Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use helixvault_storage::{
//!     BlobChunkPolicy, BlobKey, BlobStore, ConnectionPool, Executor,
//!     SettingsStore, SqliteColumnStore, StorageConfig,
//! };
//!
//! let config = StorageConfig::from_env()?;
//! let store = Arc::new(SqliteColumnStore::new("helixvault.db").await?);
//! let pool = Arc::new(ConnectionPool::single(store, &config));
//! let executor = Arc::new(Executor::new(pool, &config));
//!
//! let settings = SettingsStore::new(executor.clone());
//! let blobs = BlobStore::new(executor.clone(), BlobChunkPolicy::new(settings));
//!
//! let key = BlobKey::new("seq", "NC_000001.11");
//! blobs.store_blob(executor.default_timeout(), &key, data).await?;
//! ```

pub mod blob;
pub mod chunk_policy;
pub mod column_store;
pub mod config;
pub mod connection;
pub mod consistency;
pub mod error;
pub mod executor;
pub mod settings;
pub mod types;

pub use blob::{split_into_chunks, BlobStore};
pub use chunk_policy::{
    BlobChunkPolicy, BIG_BLOB_LIMIT_UNSET, BIG_BLOB_SIZE_SETTING, CHUNK_SIZE_DEFAULT,
    CHUNK_SIZE_MIN, LARGE_CHUNK_SIZE_SETTING,
};
pub use column_store::{ColumnStore, Fault, MemoryColumnStore, SqliteColumnStore};
pub use config::{RetryConfig, StorageConfig};
pub use connection::{Connection, ConnectionPool, StatementGuard};
pub use consistency::{Consistency, ConsistencyPolicy, OperationKind};
pub use error::{Result, StorageError};
pub use executor::{Attempt, Executor, OperationObserver, RetryPolicy};
pub use settings::SettingsStore;
pub use types::{BlobKey, BlobProps};
