// crates/decipipe-ingestion/src/main.rs
// ============================================================================
// Binary: decipipe-ingestiond
// Description: Entry point for the ingestion HTTP service (C6).
// Purpose: Load configuration, construct the configured queue adapter, and
//          serve until signalled to stop.
// ============================================================================

//! ## Overview
//! `main` returns [`ExitCode`] rather than panicking, and initialization
//! failure (here, a queue adapter the service cannot reach at startup) is
//! exit code 1, not a panic.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use decipipe_config::IngestionConfig;
use decipipe_config::QueueConfig;
use decipipe_ingestion::AppState;
use decipipe_ingestion::build_router;
use decipipe_queue::DurableFileQueue;
use decipipe_queue::HttpQueue;
use decipipe_queue::InMemoryQueue;
use decipipe_queue::QueueAdapter;
use tracing::error;
use tracing::info;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!(error = %message, "ingestion service failed to start");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), String> {
    let config = IngestionConfig::from_env().map_err(|err| err.to_string())?;
    let queue = build_queue(config.queue).await?;
    let state = AppState { queue };
    let router = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|err| err.to_string())?;
    info!(%addr, "ingestion service listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| err.to_string())?;
    info!("ingestion service shut down gracefully");
    Ok(())
}

async fn build_queue(config: QueueConfig) -> Result<Arc<dyn QueueAdapter>, String> {
    match config {
        QueueConfig::Memory => Ok(Arc::new(InMemoryQueue::new())),
        QueueConfig::Http { base_url } => Ok(Arc::new(HttpQueue::new(base_url))),
        QueueConfig::Broker { directory } => {
            DurableFileQueue::open(&directory).await.map(|queue| Arc::new(queue) as Arc<dyn QueueAdapter>).map_err(|err| err.to_string())
        }
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
