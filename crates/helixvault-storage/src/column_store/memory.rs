//! In-Memory Column Store
//!
//! A single-process stand-in for the replicated cluster. Besides holding data
//! it can misbehave on request, which is how the retry and consistency paths
//! are exercised without a real cluster:
//!
//! ```ignore
//! let store = MemoryColumnStore::new();
//!
//! // Next call fails as if the coordinator lost its replicas
//! store.inject(Fault::Unavailable).await;
//!
//! // ... run an operation ...
//!
//! // Which statements ran, at which consistency
//! let log = store.statements().await;
//! ```

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Mutex, RwLock};

use super::ColumnStore;
use crate::consistency::Consistency;
use crate::error::{Result, StorageError};
use crate::types::{BlobKey, BlobProps};

/// Misbehavior applied to the next statement.
#[derive(Debug, Clone)]
pub enum Fault {
    /// Fail with a transient `Unavailable`
    Unavailable,
    /// Fail with a terminal `InvalidQuery`
    InvalidQuery,
    /// Fail with a terminal `Unauthorized`
    Unauthorized,
    /// Sleep before answering, long enough to trip an attempt deadline
    Stall(Duration),
}

/// One statement as seen by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementRecord {
    pub statement: &'static str,
    pub consistency: Consistency,
}

#[derive(Default)]
pub struct MemoryColumnStore {
    settings: RwLock<HashMap<(String, String), String>>,
    props: RwLock<HashMap<BlobKey, BlobProps>>,
    chunks: RwLock<HashMap<(BlobKey, i64, u32), Bytes>>,
    faults: Mutex<VecDeque<Fault>>,
    log: Mutex<Vec<StatementRecord>>,
}

impl MemoryColumnStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a fault for the next statement that has not yet consumed one.
    pub async fn inject(&self, fault: Fault) {
        self.faults.lock().await.push_back(fault);
    }

    /// Every statement issued so far, in order.
    pub async fn statements(&self) -> Vec<StatementRecord> {
        self.log.lock().await.clone()
    }

    pub async fn clear_statements(&self) {
        self.log.lock().await.clear();
    }

    /// Number of rows in the settings table.
    pub async fn setting_count(&self) -> usize {
        self.settings.read().await.len()
    }

    /// Number of chunk rows stored for `key`, across all generations.
    pub async fn chunk_count(&self, key: &BlobKey) -> usize {
        self.chunks
            .read()
            .await
            .keys()
            .filter(|(k, _, _)| k == key)
            .count()
    }

    /// Remove a chunk row, as a lost write would.
    pub async fn drop_chunk(&self, key: &BlobKey, generation: i64, chunk_no: u32) {
        self.chunks
            .write()
            .await
            .remove(&(key.clone(), generation, chunk_no));
    }

    async fn begin(&self, statement: &'static str, consistency: Consistency) -> Result<()> {
        self.log.lock().await.push(StatementRecord {
            statement,
            consistency,
        });

        let fault = self.faults.lock().await.pop_front();
        match fault {
            None => Ok(()),
            Some(Fault::Unavailable) => Err(StorageError::Unavailable(format!(
                "not enough replicas for {} at {}",
                statement,
                consistency.as_str()
            ))),
            Some(Fault::InvalidQuery) => {
                Err(StorageError::InvalidQuery(format!("{statement} rejected")))
            }
            Some(Fault::Unauthorized) => {
                Err(StorageError::Unauthorized(format!("{statement} not permitted")))
            }
            Some(Fault::Stall(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl ColumnStore for MemoryColumnStore {
    async fn get_setting(
        &self,
        domain: &str,
        name: &str,
        consistency: Consistency,
    ) -> Result<Option<String>> {
        self.begin("select_setting", consistency).await?;
        Ok(self
            .settings
            .read()
            .await
            .get(&(domain.to_string(), name.to_string()))
            .cloned())
    }

    async fn put_setting(
        &self,
        domain: &str,
        name: &str,
        value: &str,
        consistency: Consistency,
    ) -> Result<()> {
        self.begin("upsert_setting", consistency).await?;
        self.settings
            .write()
            .await
            .insert((domain.to_string(), name.to_string()), value.to_string());
        Ok(())
    }

    async fn get_blob_props(
        &self,
        key: &BlobKey,
        consistency: Consistency,
    ) -> Result<Option<BlobProps>> {
        self.begin("select_blob_props", consistency).await?;
        Ok(self.props.read().await.get(key).cloned())
    }

    async fn put_blob_props(
        &self,
        key: &BlobKey,
        props: &BlobProps,
        consistency: Consistency,
    ) -> Result<()> {
        self.begin("upsert_blob_props", consistency).await?;
        self.props.write().await.insert(key.clone(), props.clone());
        Ok(())
    }

    async fn get_chunk(
        &self,
        key: &BlobKey,
        generation: i64,
        chunk_no: u32,
        consistency: Consistency,
    ) -> Result<Option<Bytes>> {
        self.begin("select_chunk", consistency).await?;
        Ok(self
            .chunks
            .read()
            .await
            .get(&(key.clone(), generation, chunk_no))
            .cloned())
    }

    async fn put_chunk(
        &self,
        key: &BlobKey,
        generation: i64,
        chunk_no: u32,
        data: Bytes,
        consistency: Consistency,
    ) -> Result<()> {
        self.begin("upsert_chunk", consistency).await?;
        self.chunks
            .write()
            .await
            .insert((key.clone(), generation, chunk_no), data);
        Ok(())
    }
}
