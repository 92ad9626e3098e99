//! Operation Kinds and Consistency Selection
//!
//! Every statement issued against the column store belongs to one
//! [`OperationKind`]. The kind carries, as data, what the executor needs to
//! know about it: whether it reads or mutates, and therefore whether a repeat
//! attempt may relax the consistency level.
//!
//! ## Policy
//!
//! ```text
//!                  first attempt      repeat attempt
//! read  + fallback  LocalQuorum   ──►   LocalOne
//! read              LocalQuorum         LocalQuorum
//! write             LocalQuorum         LocalQuorum   (never downgraded)
//! ```
//!
//! A degraded cluster (one replica of three down) still serves reads when the
//! connection opts in, while writes keep their durability guarantee.

use serde::{Deserialize, Serialize};

/// Replica agreement required for a statement to succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Consistency {
    /// Majority of replicas in the local datacenter
    LocalQuorum,
    /// Any single replica in the local datacenter
    LocalOne,
}

impl Consistency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Consistency::LocalQuorum => "local_quorum",
            Consistency::LocalOne => "local_one",
        }
    }
}

/// Closed set of storage operations dispatched through the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    SettingRead,
    SettingWrite,
    BlobPropsRead,
    BlobPropsWrite,
    ChunkRead,
    ChunkWrite,
}

impl OperationKind {
    pub fn is_read(&self) -> bool {
        matches!(
            self,
            OperationKind::SettingRead | OperationKind::BlobPropsRead | OperationKind::ChunkRead
        )
    }

    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::SettingRead => "setting_read",
            OperationKind::SettingWrite => "setting_write",
            OperationKind::BlobPropsRead => "blob_props_read",
            OperationKind::BlobPropsWrite => "blob_props_write",
            OperationKind::ChunkRead => "chunk_read",
            OperationKind::ChunkWrite => "chunk_write",
        }
    }
}

/// Chooses the consistency level of each attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsistencyPolicy;

impl ConsistencyPolicy {
    pub fn for_attempt(
        &self,
        kind: OperationKind,
        is_repeated: bool,
        fallback_enabled: bool,
    ) -> Consistency {
        if is_repeated && fallback_enabled && kind.is_read() {
            Consistency::LocalOne
        } else {
            Consistency::LocalQuorum
        }
    }
}
