//! Blob Type Definitions
//!
//! ### BlobKey
//! Identity of a blob: the domain (keyspace) it lives in plus its key.
//!
//! ### BlobProps
//! The properties row written after all chunks of a blob. Its presence is
//! what makes a blob visible to readers, and its `generation` selects which
//! set of chunks they read.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobKey {
    pub domain: String,
    pub key: String,
}

impl BlobKey {
    pub fn new(domain: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.domain, self.key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobProps {
    /// Payload length in bytes
    pub size: u64,
    /// Chunk size the payload was split with
    pub chunk_size: u64,
    /// Number of chunks, indexed `0..n_chunks`
    pub n_chunks: u32,
    /// Payload exceeded the domain's configured big-blob limit
    pub big: bool,
    /// Write generation the chunks were stored under
    pub generation: i64,
}
