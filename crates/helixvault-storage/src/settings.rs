//! Per-Domain Settings
//!
//! String key/value rows keyed by `(domain, name)`. Reads go through the
//! executor as [`OperationKind::SettingRead`] and may be downgraded to
//! single-replica consistency on a repeat attempt; writes are
//! [`OperationKind::SettingWrite`] and always stay strong.
//!
//! Nothing is cached. Every call reaches the column store.
//!
//! ## Usage
//!
//! ```ignore
//! let settings = SettingsStore::new(executor.clone());
//!
//! settings
//!     .update_setting(timeout, "ks", "LARGE_CHUNK_SZ", "1048576")
//!     .await?;
//!
//! // None means "not configured", not an error
//! let value = settings.get_setting(timeout, "ks", "LARGE_CHUNK_SZ").await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::consistency::OperationKind;
use crate::error::Result;
use crate::executor::{Executor, OperationObserver};

#[derive(Clone)]
pub struct SettingsStore {
    executor: Arc<Executor>,
}

impl SettingsStore {
    pub fn new(executor: Arc<Executor>) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Point lookup. `Ok(None)` when the setting was never written.
    pub async fn get_setting(
        &self,
        timeout: Duration,
        domain: &str,
        name: &str,
    ) -> Result<Option<String>> {
        self.get_setting_observed(timeout, domain, name, None).await
    }

    pub async fn get_setting_observed(
        &self,
        timeout: Duration,
        domain: &str,
        name: &str,
        observer: Option<&dyn OperationObserver>,
    ) -> Result<Option<String>> {
        self.executor
            .perform(
                OperationKind::SettingRead,
                timeout,
                observer,
                |conn, attempt| async move {
                    conn.store()
                        .get_setting(domain, name, attempt.consistency)
                        .await
                },
            )
            .await
    }

    /// Upsert. Fails only once retries are exhausted or on a terminal error.
    pub async fn update_setting(
        &self,
        timeout: Duration,
        domain: &str,
        name: &str,
        value: &str,
    ) -> Result<()> {
        self.update_setting_observed(timeout, domain, name, value, None)
            .await
    }

    pub async fn update_setting_observed(
        &self,
        timeout: Duration,
        domain: &str,
        name: &str,
        value: &str,
        observer: Option<&dyn OperationObserver>,
    ) -> Result<()> {
        self.executor
            .perform(
                OperationKind::SettingWrite,
                timeout,
                observer,
                |conn, attempt| async move {
                    conn.store()
                        .put_setting(domain, name, value, attempt.consistency)
                        .await
                },
            )
            .await
    }
}
