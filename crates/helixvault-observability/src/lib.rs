//! HelixVault Observability
//!
//! Request statistics, metrics and monitoring for HelixVault.
//!
//! # Features
//!
//! - 30-day per-minute request time series (requests, errors, warnings,
//!   not-found), lock-free on the hot path
//! - Minute rotation task
//! - Prometheus metrics for storage operations
//! - HTTP exporter (`/metrics`, `/statistics`) and a request-tracking
//!   middleware
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use helixvault_observability::{exporter, rotation, RequestTimeSeries};
//!
//! # async fn run() {
//! // Initialize metrics
//! helixvault_observability::init();
//!
//! // One time series for the whole process
//! let stats = Arc::new(RequestTimeSeries::new());
//! let _rotation = rotation::spawn_rotation(stats.clone(), rotation::ROTATION_PERIOD);
//!
//! // Create metrics router
//! let metrics_router = exporter::create_metrics_router(stats);
//! # }
//! ```

pub mod exporter;
pub mod metrics;
pub mod rotation;
pub mod time_series;

// Re-export commonly used items
pub use metrics::{init as init_metrics, REGISTRY};
pub use time_series::{
    Counter, CounterReport, MinuteRange, RangeSeries, RequestTimeSeries, TimeSeriesReport,
    SERIES_INTERVALS,
};

/// Initialize all observability components
pub fn init() {
    metrics::init();
}
