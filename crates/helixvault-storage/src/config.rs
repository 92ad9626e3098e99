//! Storage Configuration
//!
//! This module defines configuration for connections and the retrying executor.
//!
//! ## StorageConfig
//!
//! - **max_active_statements**: Admission ceiling per connection (default: 512)
//! - **fallback_read_consistency**: Allow repeat read attempts at single-replica
//!   consistency (default: false)
//! - **default_timeout_ms**: Per-attempt deadline when the caller has none (default: 5s)
//! - **admission_wait_ms**: Poll interval while every connection is saturated (default: 5ms)
//! - **retry**: Retry budget and backoff curve, see [`RetryConfig`]
//!
//! ## Environment
//!
//! `StorageConfig::from_env()` starts from the defaults and overlays:
//!
//! | Variable | Field |
//! |---|---|
//! | `HELIXVAULT_MAX_ACTIVE_STATEMENTS` | `max_active_statements` |
//! | `HELIXVAULT_FALLBACK_READ_CONSISTENCY` | `fallback_read_consistency` |
//! | `HELIXVAULT_TIMEOUT_MS` | `default_timeout_ms` |
//! | `HELIXVAULT_ADMISSION_WAIT_MS` | `admission_wait_ms` |
//! | `HELIXVAULT_MAX_RETRIES` | `retry.max_retries` |
//! | `HELIXVAULT_RETRY_BACKOFF_MS` | `retry.initial_backoff_ms` |
//! | `HELIXVAULT_RETRY_MAX_BACKOFF_MS` | `retry.max_backoff_ms` |
//!
//! ## Usage
//!
//! ```ignore
//! use helixvault_storage::StorageConfig;
//!
//! // Degraded-cluster tolerant reads
//! let config = StorageConfig {
//!     fallback_read_consistency: true,
//!     ..Default::default()
//! };
//! ```

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// In-flight statement ceiling per connection (default: 512)
    #[serde(default = "default_max_active_statements")]
    pub max_active_statements: usize,

    /// Downgrade repeat read attempts to single-replica consistency
    #[serde(default)]
    pub fallback_read_consistency: bool,

    /// Per-attempt deadline in milliseconds (default: 5000)
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Poll interval while waiting for admission (default: 5)
    #[serde(default = "default_admission_wait_ms")]
    pub admission_wait_ms: u64,

    #[serde(default)]
    pub retry: RetryConfig,
}

/// Retry budget for transient failures.
///
/// ```text
/// backoff(n) = min(initial_backoff_ms * backoff_multiplier^n, max_backoff_ms)
///
/// Defaults (50ms initial, 2x, 2s cap, 3 retries):
/// - Attempt 1: immediate
/// - Attempt 2: +50ms
/// - Attempt 3: +100ms
/// - Attempt 4: +200ms
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Repeat attempts after the first one (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Scale each backoff by a random factor in [0.75, 1.25)
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_active_statements: default_max_active_statements(),
            fallback_read_consistency: false,
            default_timeout_ms: default_timeout_ms(),
            admission_wait_ms: default_admission_wait_ms(),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: default_jitter(),
        }
    }
}

impl StorageConfig {
    /// Defaults overlaid with `HELIXVAULT_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(v) = env_parse("HELIXVAULT_MAX_ACTIVE_STATEMENTS")? {
            config.max_active_statements = v;
        }
        if let Some(v) = env_parse("HELIXVAULT_FALLBACK_READ_CONSISTENCY")? {
            config.fallback_read_consistency = v;
        }
        if let Some(v) = env_parse("HELIXVAULT_TIMEOUT_MS")? {
            config.default_timeout_ms = v;
        }
        if let Some(v) = env_parse("HELIXVAULT_ADMISSION_WAIT_MS")? {
            config.admission_wait_ms = v;
        }
        if let Some(v) = env_parse("HELIXVAULT_MAX_RETRIES")? {
            config.retry.max_retries = v;
        }
        if let Some(v) = env_parse("HELIXVAULT_RETRY_BACKOFF_MS")? {
            config.retry.initial_backoff_ms = v;
        }
        if let Some(v) = env_parse("HELIXVAULT_RETRY_MAX_BACKOFF_MS")? {
            config.retry.max_backoff_ms = v;
        }
        Ok(config)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn admission_wait(&self) -> Duration {
        Duration::from_millis(self.admission_wait_ms)
    }
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| StorageError::Config(format!("{name}: cannot parse {raw:?}"))),
        Err(_) => Ok(None),
    }
}

fn default_max_active_statements() -> usize {
    512
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_admission_wait_ms() -> u64 {
    5
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    50
}

fn default_max_backoff_ms() -> u64 {
    2_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> bool {
    true
}
