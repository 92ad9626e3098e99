//! SQLite Column Store
//!
//! Single-node backend built on sqlx. It stores the same logical tables as
//! the replicated cluster, which makes it suitable for development nodes and
//! for tests that need persistence across store instances.
//!
//! ## Usage
//!
//! ```ignore
//! // File-based, created if missing
//! let store = SqliteColumnStore::new("helixvault.db").await?;
//!
//! // In-memory, for tests
//! let store = SqliteColumnStore::new_in_memory().await?;
//! ```
//!
//! ## Consistency
//!
//! A single SQLite file has exactly one replica, so every consistency level
//! behaves the same. The parameter is accepted to honor the trait contract.
//!
//! ## Migrations
//!
//! Run automatically on open via `sqlx::migrate!`.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use bytes::Bytes;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use super::ColumnStore;
use crate::consistency::Consistency;
use crate::error::Result;
use crate::types::{BlobKey, BlobProps};

pub struct SqliteColumnStore {
    pool: SqlitePool,
}

impl SqliteColumnStore {
    /// Open (or create) a store backed by the file at `path`.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let options =
            SqliteConnectOptions::from_str(&format!("sqlite://{}", path.as_ref().display()))?
                .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Create in-memory database (for testing)
    pub async fn new_in_memory() -> Result<Self> {
        // Every connection to `sqlite::memory:` is a separate database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    fn now_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

#[async_trait]
impl ColumnStore for SqliteColumnStore {
    async fn get_setting(
        &self,
        domain: &str,
        name: &str,
        _consistency: Consistency,
    ) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM settings WHERE domain = ? AND name = ?")
            .bind(domain)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    async fn put_setting(
        &self,
        domain: &str,
        name: &str,
        value: &str,
        _consistency: Consistency,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (domain, name, value, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (domain, name) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(domain)
        .bind(name)
        .bind(value)
        .bind(Self::now_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_blob_props(
        &self,
        key: &BlobKey,
        _consistency: Consistency,
    ) -> Result<Option<BlobProps>> {
        let row = sqlx::query(
            r#"
            SELECT size, chunk_size, n_chunks, big, generation
            FROM blob_props
            WHERE domain = ? AND blob_key = ?
            "#,
        )
        .bind(&key.domain)
        .bind(&key.key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| BlobProps {
            size: r.get::<i64, _>("size") as u64,
            chunk_size: r.get::<i64, _>("chunk_size") as u64,
            n_chunks: r.get::<i64, _>("n_chunks") as u32,
            big: r.get::<bool, _>("big"),
            generation: r.get::<i64, _>("generation"),
        }))
    }

    async fn put_blob_props(
        &self,
        key: &BlobKey,
        props: &BlobProps,
        _consistency: Consistency,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO blob_props
                (domain, blob_key, size, chunk_size, n_chunks, big, generation, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (domain, blob_key) DO UPDATE SET
                size = excluded.size,
                chunk_size = excluded.chunk_size,
                n_chunks = excluded.n_chunks,
                big = excluded.big,
                generation = excluded.generation,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&key.domain)
        .bind(&key.key)
        .bind(props.size as i64)
        .bind(props.chunk_size as i64)
        .bind(props.n_chunks as i64)
        .bind(props.big)
        .bind(props.generation)
        .bind(Self::now_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_chunk(
        &self,
        key: &BlobKey,
        generation: i64,
        chunk_no: u32,
        _consistency: Consistency,
    ) -> Result<Option<Bytes>> {
        let row = sqlx::query(
            r#"
            SELECT data FROM blob_chunks
            WHERE domain = ? AND blob_key = ? AND generation = ? AND chunk_no = ?
            "#,
        )
        .bind(&key.domain)
        .bind(&key.key)
        .bind(generation)
        .bind(chunk_no as i64)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Bytes::from(r.get::<Vec<u8>, _>("data"))))
    }

    async fn put_chunk(
        &self,
        key: &BlobKey,
        generation: i64,
        chunk_no: u32,
        data: Bytes,
        _consistency: Consistency,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO blob_chunks (domain, blob_key, generation, chunk_no, data)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (domain, blob_key, generation, chunk_no) DO UPDATE SET data = excluded.data
            "#,
        )
        .bind(&key.domain)
        .bind(&key.key)
        .bind(generation)
        .bind(chunk_no as i64)
        .bind(data.as_ref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
