//! HelixVault Storage Node
//!
//! Main entry point for a HelixVault storage node.
//!
//! ## Overview
//! The node opens the column store, primes the chunking policy of the
//! configured domains, drives the per-minute rotation of the request time
//! series and serves the operational HTTP surface.
//!
//! ## Configuration
//! All configuration is done via environment variables:
//!
//! ### Server Settings
//! - `HELIXVAULT_ADDR`: HTTP bind address (default: 0.0.0.0:8080)
//! - `HELIXVAULT_ROTATE_SECS`: Time series rotation period (default: 60)
//!
//! ### Storage Settings
//! - `HELIXVAULT_DB`: SQLite database path (default: ./data/helixvault.db)
//! - `HELIXVAULT_CONNECTIONS`: Connections in the pool (default: 4)
//! - `HELIXVAULT_DOMAINS`: Comma separated domains whose chunk size is
//!   checked at startup (default: none)
//! - `HELIXVAULT_*`: Executor and admission settings, see `StorageConfig`
//!
//! ## HTTP API
//! - `GET /health`: Liveness
//! - `GET /ready`: 200 while some connection admits statements, 503 otherwise
//! - `GET /metrics`: Prometheus metrics
//! - `GET /statistics?ranges=0:-59`: Request time series report
//! - `POST /statistics/reset`: Clear the request time series
//!
//! ## Logging
//! Logging is controlled via the `RUST_LOG` environment variable:
//! ```bash
//! RUST_LOG=debug cargo run -p helixvault-server    # Detailed logs
//! RUST_LOG=info cargo run -p helixvault-server     # Standard logs (default)
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::get, Router};
use helixvault_observability::{exporter, rotation, RequestTimeSeries};
use helixvault_storage::{
    BlobChunkPolicy, ColumnStore, ConnectionPool, Executor, SettingsStore, SqliteColumnStore,
    StorageConfig,
};

async fn ready_handler(State(pool): State<Arc<ConnectionPool>>) -> StatusCode {
    if pool.try_acquire().is_some() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Configuration
    let bind_addr: SocketAddr = std::env::var("HELIXVAULT_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()?;

    let db_path =
        std::env::var("HELIXVAULT_DB").unwrap_or_else(|_| "./data/helixvault.db".to_string());

    let connections: usize = std::env::var("HELIXVAULT_CONNECTIONS")
        .unwrap_or_else(|_| "4".to_string())
        .parse()?;

    let rotate_secs: u64 = std::env::var("HELIXVAULT_ROTATE_SECS")
        .unwrap_or_else(|_| rotation::ROTATION_PERIOD.as_secs().to_string())
        .parse()?;

    let domains: Vec<String> = std::env::var("HELIXVAULT_DOMAINS")
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(String::from)
        .collect();

    let config = StorageConfig::from_env()?;

    // Initialize column store
    if let Some(parent) = std::path::Path::new(&db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    tracing::info!("Initializing column store at {}", db_path);
    let store: Arc<dyn ColumnStore> = Arc::new(SqliteColumnStore::new(&db_path).await?);

    let pool = Arc::new(ConnectionPool::new(vec![store; connections.max(1)], &config));
    let executor = Arc::new(Executor::new(pool.clone(), &config));
    let policy = BlobChunkPolicy::new(SettingsStore::new(executor.clone()));

    // Initialize metrics
    helixvault_observability::init();

    for domain in &domains {
        let chunk_size = policy
            .chunk_size(executor.default_timeout(), domain)
            .await?;
        let big_blob_limit = policy
            .big_blob_limit(executor.default_timeout(), domain)
            .await?;
        tracing::info!(
            domain = domain.as_str(),
            chunk_size,
            big_blob_limit,
            "Domain chunking policy"
        );
    }

    // Request statistics
    let stats = Arc::new(RequestTimeSeries::new());
    let rotation_period = Duration::from_secs(rotate_secs.max(1));
    let rotation_task = rotation::spawn_rotation(stats.clone(), rotation_period);

    let app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/ready", get(ready_handler))
        .with_state(pool.clone())
        .layer(axum::middleware::from_fn_with_state(
            stats.clone(),
            exporter::track_requests,
        ))
        .merge(exporter::create_metrics_router(stats));

    tracing::info!("HelixVault node starting on {}", bind_addr);
    tracing::info!("Configuration:");
    tracing::info!("  Connections: {}", pool.connections().len());
    tracing::info!("  Max active statements: {}", config.max_active_statements);
    tracing::info!("  Fallback read consistency: {}", config.fallback_read_consistency);
    tracing::info!("  Max retries: {}", executor.retry_policy().max_retries);
    tracing::info!("  Rotation period: {:?}", rotation_period);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    rotation_task.abort();
    tracing::info!("HelixVault node shut down gracefully");

    Ok(())
}
