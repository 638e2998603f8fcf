// crates/decipipe-query/src/main.rs
// ============================================================================
// Binary: decipipe-queryd
// Description: Entry point for the query HTTP service (C10).
// Purpose: Open the configured analytical and blob stores and serve until
//          signalled to stop.
// ============================================================================

//! ## Overview
//! Same entry-point shape as `decipipe-ingestiond` and `decipipe-processord`:
//! `main` returns [`ExitCode`], and a store that cannot be opened is exit
//! code 1 rather than a panic.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use decipipe_analytics::AnalyticsStore;
use decipipe_blobstore::BlobStore;
use decipipe_blobstore::LocalFsBlobStore;
use decipipe_blobstore::S3BlobStore;
use decipipe_blobstore::S3BlobStoreConfig;
use decipipe_config::BlobConfig;
use decipipe_config::QueryConfig;
use decipipe_query::AppState;
use decipipe_query::build_router;
use tracing::error;
use tracing::info;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!(error = %message, "query service failed to start");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), String> {
    let config = QueryConfig::from_env().map_err(|err| err.to_string())?;
    let analytics = Arc::new(AnalyticsStore::open(&config.analytical.database_path).map_err(|err| err.to_string())?);
    let blob = build_blob_store(config.blob).await?;
    let state = AppState { analytics, blob };
    let router = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|err| err.to_string())?;
    info!(%addr, "query service listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| err.to_string())?;
    info!("query service shut down gracefully");
    Ok(())
}

async fn build_blob_store(config: BlobConfig) -> Result<Arc<dyn BlobStore>, String> {
    match config {
        BlobConfig::Local { root } => LocalFsBlobStore::new(root).await.map(|store| Arc::new(store) as Arc<dyn BlobStore>).map_err(|err| err.to_string()),
        BlobConfig::S3 {
            bucket,
            region,
            endpoint,
            prefix,
            force_path_style,
        } => S3BlobStore::new(S3BlobStoreConfig {
            bucket,
            region,
            endpoint,
            prefix,
            force_path_style,
        })
        .await
        .map(|store| Arc::new(store) as Arc<dyn BlobStore>)
        .map_err(|err| err.to_string()),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        let Ok(mut signal) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) else {
            return;
        };
        signal.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
