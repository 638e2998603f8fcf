// crates/decipipe-processor/src/main.rs
// ============================================================================
// Binary: decipipe-processord
// Description: Entry point for the processor worker (C7).
// Purpose: Construct the configured queue, blob store, and analytical
//          store, then run the poll loop until signalled to stop.
// ============================================================================

//! ## Overview
//! Same entry-point shape as `decipipe-ingestiond`: `main` returns
//! [`ExitCode`], and any construction failure (an unreachable broker, a
//! store that cannot be opened) is exit code 1 rather than a panic.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use decipipe_analytics::AnalyticsStore;
use decipipe_blobstore::BlobStore;
use decipipe_blobstore::LocalFsBlobStore;
use decipipe_blobstore::S3BlobStore;
use decipipe_blobstore::S3BlobStoreConfig;
use decipipe_config::AnalyticalConfig;
use decipipe_config::BlobConfig;
use decipipe_config::ProcessorConfig;
use decipipe_config::QueueConfig;
use decipipe_processor::Processor;
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
            error!(error = %message, "processor failed to start");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), String> {
    let config = ProcessorConfig::from_env().map_err(|err| err.to_string())?;
    let queue = build_queue(config.queue).await?;
    let blob = build_blob_store(config.blob).await?;
    let analytics = Arc::new(build_analytics_store(config.analytical)?);

    let mut processor = Processor::new(queue, blob, analytics, config.batch_size, Duration::from_millis(config.poll_interval_ms));
    info!(batch_size = config.batch_size, poll_interval_ms = config.poll_interval_ms, "processor started");
    processor.run_until(shutdown_signal()).await;
    info!("processor shut down gracefully");
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

fn build_analytics_store(config: AnalyticalConfig) -> Result<AnalyticsStore, String> {
    AnalyticsStore::open(&config.database_path).map_err(|err| err.to_string())
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
