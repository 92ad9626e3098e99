//! Column Store Driver Seam
//!
//! The replicated column store is reached through the [`ColumnStore`] trait.
//! Everything above it (executor, settings, chunk policy, blobs) is written
//! against the trait only, so backends can be swapped without touching the
//! retry or consistency logic.
//!
//! ## Logical Schema
//!
//! ```text
//! settings     (domain, name)                      -> value
//! blob_props   (domain, key)                       -> size, chunk_size, n_chunks, big, generation
//! blob_chunks  (domain, key, generation, chunk_no) -> data
//! ```
//!
//! All writes are upserts (last write wins). Chunks of different generations
//! never overwrite each other.
//!
//! ## Implementations
//!
//! - **MemoryColumnStore**: In-process maps, with fault injection and a log of
//!   the consistency level of every call. Used by tests and local runs.
//! - **SqliteColumnStore**: Single-node SQLite through sqlx. Consistency levels
//!   are accepted and have no effect.
//!
//! ## Thread Safety
//!
//! Implementations must be Send + Sync, allowing safe sharing across async
//! tasks via `Arc<dyn ColumnStore>`.

pub mod memory;
pub mod sqlite;

pub use memory::{Fault, MemoryColumnStore, StatementRecord};
pub use sqlite::SqliteColumnStore;

use async_trait::async_trait;
use bytes::Bytes;

use crate::consistency::Consistency;
use crate::error::Result;
use crate::types::{BlobKey, BlobProps};

#[async_trait]
pub trait ColumnStore: Send + Sync {
    // ============================================================
    // SETTINGS
    // ============================================================

    /// Point lookup in the settings table. `None` when the row is absent.
    async fn get_setting(
        &self,
        domain: &str,
        name: &str,
        consistency: Consistency,
    ) -> Result<Option<String>>;

    /// Upsert a settings row.
    async fn put_setting(
        &self,
        domain: &str,
        name: &str,
        value: &str,
        consistency: Consistency,
    ) -> Result<()>;

    // ============================================================
    // BLOBS
    // ============================================================

    async fn get_blob_props(
        &self,
        key: &BlobKey,
        consistency: Consistency,
    ) -> Result<Option<BlobProps>>;

    async fn put_blob_props(
        &self,
        key: &BlobKey,
        props: &BlobProps,
        consistency: Consistency,
    ) -> Result<()>;

    async fn get_chunk(
        &self,
        key: &BlobKey,
        generation: i64,
        chunk_no: u32,
        consistency: Consistency,
    ) -> Result<Option<Bytes>>;

    async fn put_chunk(
        &self,
        key: &BlobKey,
        generation: i64,
        chunk_no: u32,
        data: Bytes,
        consistency: Consistency,
    ) -> Result<()>;
}
