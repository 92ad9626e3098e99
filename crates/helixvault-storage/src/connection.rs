//! Connections and Admission Control
//!
//! A [`Connection`] is a handle on the column store plus a live count of the
//! statements it currently has in flight. Before a statement is issued, the
//! caller asks the connection whether it is below its ceiling
//! ([`Connection::check_max_active`]). That check is the only backpressure in
//! the system: it never blocks and never queues.
//!
//! ## Flow
//!
//! ```text
//! ConnectionPool::acquire(timeout)
//!     │
//!     ├─► conn[i].check_max_active()  ── true ──► use conn[i]
//!     ├─► conn[i+1].check_max_active() ...
//!     │
//!     └─► none admitted: sleep(admission_wait), poll again
//!                        until timeout ──► StorageError::Overloaded
//! ```
//!
//! ## Slack
//!
//! The check is a plain read of the counter. Two tasks may both see 511 and
//! both proceed, putting 513 statements in flight. The ceiling is a soft
//! bound; overshoot is limited to the number of racing callers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use helixvault_observability::metrics::{ACTIVE_STATEMENTS, ADMISSION_DEFERRALS_TOTAL};
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::column_store::ColumnStore;
use crate::config::StorageConfig;
use crate::error::{Result, StorageError};

pub struct Connection {
    store: Arc<dyn ColumnStore>,
    active_statements: AtomicUsize,
    max_active_statements: usize,
    fallback_read_consistency: bool,
}

impl Connection {
    pub fn new(store: Arc<dyn ColumnStore>, config: &StorageConfig) -> Self {
        Self {
            store,
            active_statements: AtomicUsize::new(0),
            max_active_statements: config.max_active_statements,
            fallback_read_consistency: config.fallback_read_consistency,
        }
    }

    /// True iff another statement may be issued on this connection.
    pub fn check_max_active(&self) -> bool {
        self.active_statements() < self.max_active_statements
    }

    pub fn active_statements(&self) -> usize {
        self.active_statements.load(Ordering::Acquire)
    }

    pub fn max_active_statements(&self) -> usize {
        self.max_active_statements
    }

    /// Whether repeat read attempts may use single-replica consistency.
    pub fn fallback_read_consistency(&self) -> bool {
        self.fallback_read_consistency
    }

    pub fn store(&self) -> &dyn ColumnStore {
        self.store.as_ref()
    }

    /// Mark a statement as in flight until the guard is dropped.
    pub fn begin_statement(&self) -> StatementGuard<'_> {
        self.active_statements.fetch_add(1, Ordering::AcqRel);
        ACTIVE_STATEMENTS.inc();
        StatementGuard { conn: self }
    }
}

/// Keeps one statement counted against its connection.
pub struct StatementGuard<'a> {
    conn: &'a Connection,
}

impl Drop for StatementGuard<'_> {
    fn drop(&mut self) {
        self.conn.active_statements.fetch_sub(1, Ordering::AcqRel);
        ACTIVE_STATEMENTS.dec();
    }
}

/// Round-robin set of connections gated by admission.
pub struct ConnectionPool {
    connections: Vec<Arc<Connection>>,
    next: AtomicUsize,
    admission_wait: Duration,
}

impl ConnectionPool {
    /// Build a pool with one connection per store handle.
    ///
    /// # Panics
    ///
    /// Panics if `stores` is empty.
    pub fn new(stores: Vec<Arc<dyn ColumnStore>>, config: &StorageConfig) -> Self {
        assert!(!stores.is_empty(), "connection pool needs at least one store");
        Self {
            connections: stores
                .into_iter()
                .map(|store| Arc::new(Connection::new(store, config)))
                .collect(),
            next: AtomicUsize::new(0),
            admission_wait: config.admission_wait(),
        }
    }

    /// Pool over a single store, for single-node setups.
    pub fn single(store: Arc<dyn ColumnStore>, config: &StorageConfig) -> Self {
        Self::new(vec![store], config)
    }

    pub fn connections(&self) -> &[Arc<Connection>] {
        &self.connections
    }

    /// First admitting connection, starting after the last one handed out.
    pub fn try_acquire(&self) -> Option<Arc<Connection>> {
        let n = self.connections.len();
        let start = self.next.fetch_add(1, Ordering::Relaxed);
        (0..n)
            .map(|i| &self.connections[(start + i) % n])
            .find(|conn| conn.check_max_active())
            .cloned()
    }

    /// Wait up to `timeout` for an admitting connection.
    pub async fn acquire(&self, timeout: Duration) -> Result<Arc<Connection>> {
        let deadline = Instant::now() + timeout;
        let mut deferred = false;

        loop {
            if let Some(conn) = self.try_acquire() {
                return Ok(conn);
            }
            if !deferred {
                ADMISSION_DEFERRALS_TOTAL.inc();
                debug!(
                    connections = self.connections.len(),
                    "All connections at capacity, deferring"
                );
                deferred = true;
            }
            if Instant::now() + self.admission_wait > deadline {
                return Err(StorageError::Overloaded(timeout));
            }
            sleep(self.admission_wait).await;
        }
    }
}
