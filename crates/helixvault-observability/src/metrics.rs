use lazy_static::lazy_static;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Once;

static INIT: Once = Once::new();

lazy_static! {
    /// Global Prometheus metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Storage Operation Metrics
    // ============================================================================

    /// Storage operations by kind and final outcome
    pub static ref STORAGE_OPERATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("helixvault_storage_operations_total", "Total storage operations"),
        &["operation", "outcome"] // outcome: ok, failed, exhausted
    ).expect("metric can be created");

    /// Repeat attempts issued by the executor
    pub static ref STORAGE_RETRIES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("helixvault_storage_retries_total", "Total storage operation retries"),
        &["operation"]
    ).expect("metric can be created");

    /// Attempts issued at the weaker consistency level
    pub static ref CONSISTENCY_DOWNGRADES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("helixvault_consistency_downgrades_total", "Total attempts with downgraded read consistency"),
        &["operation"]
    ).expect("metric can be created");

    /// End-to-end latency of a storage operation, retries included
    pub static ref STORAGE_OPERATION_LATENCY: HistogramVec = HistogramVec::new(
        HistogramOpts::new("helixvault_storage_operation_latency_seconds", "Storage operation latency in seconds")
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        &["operation"]
    ).expect("metric can be created");

    /// Statements currently in flight across all connections
    pub static ref ACTIVE_STATEMENTS: IntGauge = IntGauge::new(
        "helixvault_active_statements",
        "Number of in-flight column store statements"
    ).expect("metric can be created");

    /// Times a caller had to wait because every connection was at its ceiling
    pub static ref ADMISSION_DEFERRALS_TOTAL: IntCounter = IntCounter::new(
        "helixvault_admission_deferrals_total",
        "Total admission deferrals"
    ).expect("metric can be created");

    // ============================================================================
    // Settings & Blob Metrics
    // ============================================================================

    /// Defaults written back by the chunk policy
    pub static ref SETTING_WRITE_BACKS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("helixvault_setting_write_backs_total", "Total default settings written back"),
        &["setting"]
    ).expect("metric can be created");

    /// Blob chunks written
    pub static ref BLOB_CHUNKS_WRITTEN_TOTAL: IntCounter = IntCounter::new(
        "helixvault_blob_chunks_written_total",
        "Total blob chunks written"
    ).expect("metric can be created");

    /// Blob chunks read
    pub static ref BLOB_CHUNKS_READ_TOTAL: IntCounter = IntCounter::new(
        "helixvault_blob_chunks_read_total",
        "Total blob chunks read"
    ).expect("metric can be created");

    /// Blob payload bytes written
    pub static ref BLOB_BYTES_WRITTEN_TOTAL: IntCounter = IntCounter::new(
        "helixvault_blob_bytes_written_total",
        "Total blob bytes written"
    ).expect("metric can be created");
}

/// Initialize metrics registry
/// Can be called multiple times safely (idempotent)
pub fn init() {
    INIT.call_once(|| {
        // Storage operation metrics
        REGISTRY
            .register(Box::new(STORAGE_OPERATIONS_TOTAL.clone()))
            .expect("storage_operations_total can be registered");
        REGISTRY
            .register(Box::new(STORAGE_RETRIES_TOTAL.clone()))
            .expect("storage_retries_total can be registered");
        REGISTRY
            .register(Box::new(CONSISTENCY_DOWNGRADES_TOTAL.clone()))
            .expect("consistency_downgrades_total can be registered");
        REGISTRY
            .register(Box::new(STORAGE_OPERATION_LATENCY.clone()))
            .expect("storage_operation_latency can be registered");
        REGISTRY
            .register(Box::new(ACTIVE_STATEMENTS.clone()))
            .expect("active_statements can be registered");
        REGISTRY
            .register(Box::new(ADMISSION_DEFERRALS_TOTAL.clone()))
            .expect("admission_deferrals_total can be registered");

        // Settings & blob metrics
        REGISTRY
            .register(Box::new(SETTING_WRITE_BACKS_TOTAL.clone()))
            .expect("setting_write_backs_total can be registered");
        REGISTRY
            .register(Box::new(BLOB_CHUNKS_WRITTEN_TOTAL.clone()))
            .expect("blob_chunks_written_total can be registered");
        REGISTRY
            .register(Box::new(BLOB_CHUNKS_READ_TOTAL.clone()))
            .expect("blob_chunks_read_total can be registered");
        REGISTRY
            .register(Box::new(BLOB_BYTES_WRITTEN_TOTAL.clone()))
            .expect("blob_bytes_written_total can be registered");
    });
}
