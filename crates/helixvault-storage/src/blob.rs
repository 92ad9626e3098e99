//! Chunked Blob Storage
//!
//! A blob is one logical payload stored as ordered chunks plus a properties
//! row. The chunk size comes from the domain's [`BlobChunkPolicy`] at write
//! time and is recorded in the properties, so later policy changes never
//! affect how an existing blob is read back.
//!
//! ## Write Path
//!
//! ```text
//! store_blob(key, data)
//!     │
//!     ├─► chunk_size(domain), big_blob_limit(domain)
//!     ├─► next generation g
//!     ├─► put_chunk(key, g, 0) .. put_chunk(key, g, n-1)   ChunkWrite
//!     └─► put_blob_props(key, props { generation: g })     BlobPropsWrite
//! ```
//!
//! Every write stores its chunks under a fresh generation and props are
//! written last, so a reader that finds props can expect every chunk of that
//! generation to exist. A writer that fails midway leaves orphan chunks under
//! its own generation; readers keep seeing the previous blob, or no blob at
//! all for a first write. Chunks of superseded generations are not reclaimed.
//!
//! ## Read Path
//!
//! Props first, then the chunks of `props.generation` in order. Both are
//! read operations and may be downgraded on retry when the connection allows
//! it.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use helixvault_observability::metrics::{
    BLOB_BYTES_WRITTEN_TOTAL, BLOB_CHUNKS_READ_TOTAL, BLOB_CHUNKS_WRITTEN_TOTAL,
};
use tracing::debug;

use crate::chunk_policy::{BlobChunkPolicy, BIG_BLOB_LIMIT_UNSET};
use crate::consistency::OperationKind;
use crate::error::{Result, StorageError};
use crate::executor::Executor;
use crate::types::{BlobKey, BlobProps};

/// Split `data` into consecutive slices of `chunk_size` bytes. The last
/// slice may be shorter. Slices share the underlying buffer.
pub fn split_into_chunks(data: &Bytes, chunk_size: usize) -> Vec<Bytes> {
    let chunk_size = chunk_size.max(1);
    (0..data.len())
        .step_by(chunk_size)
        .map(|start| data.slice(start..(start + chunk_size).min(data.len())))
        .collect()
}

static LAST_GENERATION: AtomicI64 = AtomicI64::new(0);

/// Wall-clock microseconds, bumped past the last value handed out in this
/// process so successive writes never share a generation.
fn next_generation() -> i64 {
    let now = chrono::Utc::now().timestamp_micros();
    match LAST_GENERATION.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |last| {
        Some(now.max(last + 1))
    }) {
        Ok(last) | Err(last) => now.max(last + 1),
    }
}

#[derive(Clone)]
pub struct BlobStore {
    executor: Arc<Executor>,
    policy: BlobChunkPolicy,
}

impl BlobStore {
    pub fn new(executor: Arc<Executor>, policy: BlobChunkPolicy) -> Self {
        Self { executor, policy }
    }

    pub fn policy(&self) -> &BlobChunkPolicy {
        &self.policy
    }

    /// Write `data` under `key`, replacing any previous blob.
    pub async fn store_blob(
        &self,
        timeout: Duration,
        key: &BlobKey,
        data: Bytes,
    ) -> Result<BlobProps> {
        let chunk_size = self.policy.chunk_size(timeout, &key.domain).await?;
        let big_limit = self.policy.big_blob_limit(timeout, &key.domain).await?;

        let chunks = split_into_chunks(&data, chunk_size as usize);
        let props = BlobProps {
            size: data.len() as u64,
            chunk_size: chunk_size as u64,
            n_chunks: chunks.len() as u32,
            big: big_limit != BIG_BLOB_LIMIT_UNSET
                && big_limit >= 0
                && data.len() as u64 > big_limit as u64,
            generation: next_generation(),
        };
        let generation = props.generation;

        for (chunk_no, chunk) in chunks.into_iter().enumerate() {
            let chunk_no = chunk_no as u32;
            self.executor
                .perform(
                    OperationKind::ChunkWrite,
                    timeout,
                    None,
                    |conn, attempt| {
                        let chunk = chunk.clone();
                        async move {
                            conn.store()
                                .put_chunk(key, generation, chunk_no, chunk, attempt.consistency)
                                .await
                        }
                    },
                )
                .await?;
            BLOB_CHUNKS_WRITTEN_TOTAL.inc();
        }

        self.executor
            .perform(
                OperationKind::BlobPropsWrite,
                timeout,
                None,
                |conn, attempt| {
                    let props = &props;
                    async move {
                        conn.store()
                            .put_blob_props(key, props, attempt.consistency)
                            .await
                    }
                },
            )
            .await?;
        BLOB_BYTES_WRITTEN_TOTAL.inc_by(props.size);

        debug!(
            blob = %key,
            size = props.size,
            n_chunks = props.n_chunks,
            generation,
            big = props.big,
            "Stored blob"
        );
        Ok(props)
    }

    /// Read the blob under `key`. `Ok(None)` when no props row exists.
    pub async fn load_blob(&self, timeout: Duration, key: &BlobKey) -> Result<Option<Bytes>> {
        let Some(props) = self.load_props(timeout, key).await? else {
            return Ok(None);
        };

        let generation = props.generation;
        let mut data = BytesMut::with_capacity(props.size as usize);
        for chunk_no in 0..props.n_chunks {
            let chunk = self
                .executor
                .perform(
                    OperationKind::ChunkRead,
                    timeout,
                    None,
                    |conn, attempt| async move {
                        conn.store()
                            .get_chunk(key, generation, chunk_no, attempt.consistency)
                            .await
                    },
                )
                .await?
                .ok_or_else(|| corrupt(key, format!("chunk {chunk_no} missing")))?;
            BLOB_CHUNKS_READ_TOTAL.inc();
            data.extend_from_slice(&chunk);
        }

        if data.len() as u64 != props.size {
            return Err(corrupt(
                key,
                format!("expected {} bytes, found {}", props.size, data.len()),
            ));
        }
        Ok(Some(data.freeze()))
    }

    /// Properties row only, without touching chunks.
    pub async fn load_props(&self, timeout: Duration, key: &BlobKey) -> Result<Option<BlobProps>> {
        self.executor
            .perform(
                OperationKind::BlobPropsRead,
                timeout,
                None,
                |conn, attempt| async move {
                    conn.store().get_blob_props(key, attempt.consistency).await
                },
            )
            .await
    }
}

fn corrupt(key: &BlobKey, reason: String) -> StorageError {
    StorageError::CorruptBlob {
        domain: key.domain.clone(),
        key: key.key.clone(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk_policy::{BIG_BLOB_SIZE_SETTING, CHUNK_SIZE_DEFAULT, LARGE_CHUNK_SIZE_SETTING};
    use crate::column_store::{Fault, MemoryColumnStore};
    use crate::config::{RetryConfig, StorageConfig};
    use crate::connection::ConnectionPool;
    use crate::settings::SettingsStore;

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn setup() -> (Arc<MemoryColumnStore>, BlobStore) {
        let config = StorageConfig {
            retry: RetryConfig {
                initial_backoff_ms: 1,
                jitter: false,
                ..Default::default()
            },
            ..Default::default()
        };
        let store = Arc::new(MemoryColumnStore::new());
        let pool = Arc::new(ConnectionPool::single(store.clone(), &config));
        let executor = Arc::new(Executor::new(pool, &config));
        let policy = BlobChunkPolicy::new(SettingsStore::new(executor.clone()));
        (store, BlobStore::new(executor, policy))
    }

    async fn set(blobs: &BlobStore, name: &str, value: &str) {
        blobs
            .policy()
            .settings()
            .update_setting(TIMEOUT, "ks", name, value)
            .await
            .unwrap();
    }

    #[test]
    fn test_split_into_chunks() {
        let data = Bytes::from_static(b"ACGTACGTAC");

        let chunks = split_into_chunks(&data, 4);
        assert_eq!(
            chunks,
            vec![
                Bytes::from_static(b"ACGT"),
                Bytes::from_static(b"ACGT"),
                Bytes::from_static(b"AC"),
            ]
        );

        assert_eq!(split_into_chunks(&data, 10).len(), 1);
        assert_eq!(split_into_chunks(&data, 64).len(), 1);
        assert!(split_into_chunks(&Bytes::new(), 4).is_empty());
    }

    #[tokio::test]
    async fn test_small_blob_single_chunk() {
        let (store, blobs) = setup();
        let key = BlobKey::new("ks", "NC_000001");

        let props = blobs
            .store_blob(TIMEOUT, &key, Bytes::from_static(b"ACGTN"))
            .await
            .unwrap();

        assert_eq!(props.size, 5);
        assert_eq!(props.chunk_size, CHUNK_SIZE_DEFAULT as u64);
        assert_eq!(props.n_chunks, 1);
        assert!(!props.big);
        assert_eq!(store.chunk_count(&key).await, 1);

        let loaded = blobs.load_blob(TIMEOUT, &key).await.unwrap();
        assert_eq!(loaded, Some(Bytes::from_static(b"ACGTN")));
    }

    #[tokio::test]
    async fn test_large_blob_is_chunked() {
        let (store, blobs) = setup();
        set(&blobs, LARGE_CHUNK_SIZE_SETTING, "4096").await;
        let key = BlobKey::new("ks", "chr1");
        let data: Bytes = (0..10_000u32).map(|i| (i % 251) as u8).collect::<Vec<_>>().into();

        let props = blobs.store_blob(TIMEOUT, &key, data.clone()).await.unwrap();

        assert_eq!(props.n_chunks, 3);
        assert_eq!(store.chunk_count(&key).await, 3);
        assert_eq!(blobs.load_blob(TIMEOUT, &key).await.unwrap(), Some(data));
    }

    #[tokio::test]
    async fn test_props_written_after_chunks() {
        let (store, blobs) = setup();
        set(&blobs, LARGE_CHUNK_SIZE_SETTING, "4096").await;
        store.clear_statements().await;

        blobs
            .store_blob(TIMEOUT, &BlobKey::new("ks", "b"), Bytes::from(vec![7u8; 5000]))
            .await
            .unwrap();

        let writes: Vec<_> = store
            .statements()
            .await
            .into_iter()
            .map(|record| record.statement)
            .filter(|statement| statement.starts_with("upsert"))
            .collect();
        assert_eq!(writes, vec!["upsert_chunk", "upsert_chunk", "upsert_blob_props"]);
    }

    #[tokio::test]
    async fn test_big_flag_follows_limit() {
        let (_store, blobs) = setup();
        let data = Bytes::from(vec![1u8; 100]);

        let unset = blobs
            .store_blob(TIMEOUT, &BlobKey::new("ks", "a"), data.clone())
            .await
            .unwrap();
        assert!(!unset.big);

        set(&blobs, BIG_BLOB_SIZE_SETTING, "100").await;
        let at_limit = blobs
            .store_blob(TIMEOUT, &BlobKey::new("ks", "b"), data.clone())
            .await
            .unwrap();
        assert!(!at_limit.big);

        set(&blobs, BIG_BLOB_SIZE_SETTING, "99").await;
        let over = blobs
            .store_blob(TIMEOUT, &BlobKey::new("ks", "c"), data)
            .await
            .unwrap();
        assert!(over.big);
    }

    #[tokio::test]
    async fn test_missing_blob_is_none() {
        let (_store, blobs) = setup();
        let loaded = blobs
            .load_blob(TIMEOUT, &BlobKey::new("ks", "absent"))
            .await
            .unwrap();
        assert_eq!(loaded, None);
    }

    #[tokio::test]
    async fn test_missing_chunk_is_corrupt() {
        let (store, blobs) = setup();
        set(&blobs, LARGE_CHUNK_SIZE_SETTING, "4096").await;
        let key = BlobKey::new("ks", "lossy");
        let props = blobs
            .store_blob(TIMEOUT, &key, Bytes::from(vec![0u8; 9000]))
            .await
            .unwrap();

        store.drop_chunk(&key, props.generation, 1).await;

        match blobs.load_blob(TIMEOUT, &key).await {
            Err(StorageError::CorruptBlob { key: k, reason, .. }) => {
                assert_eq!(k, "lossy");
                assert!(reason.contains("chunk 1"));
            }
            other => panic!("expected CorruptBlob, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_chunk_write_retried_on_transient_failure() {
        let (store, blobs) = setup();
        let key = BlobKey::new("ks", "flaky");
        // chunk_size read, write-back, big_blob_limit read, then the chunk
        store.inject(Fault::Stall(Duration::ZERO)).await;
        store.inject(Fault::Stall(Duration::ZERO)).await;
        store.inject(Fault::Stall(Duration::ZERO)).await;
        store.inject(Fault::Unavailable).await;

        blobs
            .store_blob(TIMEOUT, &key, Bytes::from_static(b"ACGT"))
            .await
            .unwrap();

        let chunk_writes = store
            .statements()
            .await
            .into_iter()
            .filter(|record| record.statement == "upsert_chunk")
            .count();
        assert_eq!(chunk_writes, 2);
        assert_eq!(
            blobs.load_blob(TIMEOUT, &key).await.unwrap(),
            Some(Bytes::from_static(b"ACGT"))
        );
    }

    #[test]
    fn test_generations_strictly_increase() {
        let first = next_generation();
        let second = next_generation();
        let third = next_generation();
        assert!(first < second);
        assert!(second < third);
    }

    #[tokio::test]
    async fn test_failed_overwrite_keeps_previous_blob() {
        let (store, blobs) = setup();
        set(&blobs, LARGE_CHUNK_SIZE_SETTING, "4096").await;
        let key = BlobKey::new("ks", "overwritten");
        let original = Bytes::from(vec![b'A'; 8192]);
        let first = blobs.store_blob(TIMEOUT, &key, original.clone()).await.unwrap();
        assert_eq!(first.n_chunks, 2);

        // chunk_size read, big_blob_limit read and chunk 0 pass, chunk 1 fails
        store.inject(Fault::Stall(Duration::ZERO)).await;
        store.inject(Fault::Stall(Duration::ZERO)).await;
        store.inject(Fault::Stall(Duration::ZERO)).await;
        store.inject(Fault::Unauthorized).await;

        let result = blobs
            .store_blob(TIMEOUT, &key, Bytes::from(vec![b'B'; 8192]))
            .await;
        assert!(matches!(result, Err(StorageError::Unauthorized(_))));

        assert_eq!(blobs.load_blob(TIMEOUT, &key).await.unwrap(), Some(original));
        let props = blobs.load_props(TIMEOUT, &key).await.unwrap().unwrap();
        assert_eq!(props, first);
        // Orphan chunk 0 of the failed write sits beside the live ones
        assert_eq!(store.chunk_count(&key).await, 3);
    }

    #[tokio::test]
    async fn test_successful_overwrite_switches_generation() {
        let (_store, blobs) = setup();
        set(&blobs, LARGE_CHUNK_SIZE_SETTING, "4096").await;
        let key = BlobKey::new("ks", "replaced");

        let first = blobs
            .store_blob(TIMEOUT, &key, Bytes::from(vec![1u8; 9000]))
            .await
            .unwrap();
        let replacement = Bytes::from(vec![2u8; 5000]);
        let second = blobs
            .store_blob(TIMEOUT, &key, replacement.clone())
            .await
            .unwrap();

        assert!(second.generation > first.generation);
        assert_eq!(second.n_chunks, 2);
        assert_eq!(blobs.load_blob(TIMEOUT, &key).await.unwrap(), Some(replacement));
    }
}
