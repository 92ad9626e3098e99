//! Blob Chunking Policy
//!
//! Two per-domain settings control how blobs are laid out:
//!
//! | Setting | Meaning | Missing / invalid |
//! |---|---|---|
//! | `LARGE_CHUNK_SZ` | Chunk size in bytes, at least 4096 | 524288, written back |
//! | `BIG_BLOB_SZ` | Size above which a blob is flagged big | -1, nothing written |
//!
//! The chunk size must always be usable by a writer, so a bad or absent value
//! is replaced by the default and the default is persisted for later readers.
//! The big-blob limit is an optional override; its absence is a normal state
//! and is reported as [`BIG_BLOB_LIMIT_UNSET`].

use std::time::Duration;

use helixvault_observability::metrics::SETTING_WRITE_BACKS_TOTAL;
use tracing::{info, warn};

use crate::error::Result;
use crate::settings::SettingsStore;

pub const LARGE_CHUNK_SIZE_SETTING: &str = "LARGE_CHUNK_SZ";
pub const BIG_BLOB_SIZE_SETTING: &str = "BIG_BLOB_SZ";

/// Smallest chunk size ever returned.
pub const CHUNK_SIZE_MIN: i64 = 4096;
pub const CHUNK_SIZE_DEFAULT: i64 = 524_288;
/// Sentinel for "no big-blob limit configured".
pub const BIG_BLOB_LIMIT_UNSET: i64 = -1;

#[derive(Clone)]
pub struct BlobChunkPolicy {
    settings: SettingsStore,
}

impl BlobChunkPolicy {
    pub fn new(settings: SettingsStore) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    /// Effective chunk size for `domain`, never below [`CHUNK_SIZE_MIN`].
    ///
    /// Errors only when the setting cannot be read at all. A failed
    /// write-back of the default is logged and the default still returned.
    pub async fn chunk_size(&self, timeout: Duration, domain: &str) -> Result<i64> {
        let stored = self
            .settings
            .get_setting(timeout, domain, LARGE_CHUNK_SIZE_SETTING)
            .await?;

        if let Some(size) = stored
            .as_deref()
            .and_then(parse_setting)
            .filter(|size| *size >= CHUNK_SIZE_MIN)
        {
            return Ok(size);
        }

        info!(
            domain,
            stored = stored.as_deref().unwrap_or("<unset>"),
            default = CHUNK_SIZE_DEFAULT,
            "Chunk size missing or invalid, writing back default"
        );
        match self
            .settings
            .update_setting(
                timeout,
                domain,
                LARGE_CHUNK_SIZE_SETTING,
                &CHUNK_SIZE_DEFAULT.to_string(),
            )
            .await
        {
            Ok(()) => {
                SETTING_WRITE_BACKS_TOTAL
                    .with_label_values(&[LARGE_CHUNK_SIZE_SETTING])
                    .inc();
            }
            Err(e) => {
                warn!(domain, error = %e, "Failed to persist default chunk size");
            }
        }
        Ok(CHUNK_SIZE_DEFAULT)
    }

    /// Configured big-blob limit for `domain`, or [`BIG_BLOB_LIMIT_UNSET`].
    pub async fn big_blob_limit(&self, timeout: Duration, domain: &str) -> Result<i64> {
        let stored = self
            .settings
            .get_setting(timeout, domain, BIG_BLOB_SIZE_SETTING)
            .await?;

        Ok(stored
            .as_deref()
            .and_then(parse_setting)
            .unwrap_or(BIG_BLOB_LIMIT_UNSET))
    }
}

fn parse_setting(value: &str) -> Option<i64> {
    value.trim().parse().ok()
}
