// crates/decipipe-config/src/lib.rs
// ============================================================================
// Crate: decipipe-config
// Description: Environment-variable configuration for the three services.
// Purpose: One fail-closed loader per service, using the recognised keys:
//          QUEUE_TYPE/QUEUE_URL/BROKER_URL, ANALYTICAL_*, BLOB_*,
//          POLL_INTERVAL_MS, BATCH_SIZE, PORT.
// ============================================================================

//! ## Overview
//! Strict parsing that fails closed rather than silently substituting a
//! default: a misconfigured service should refuse to start with exit code
//! 1 rather than run with unintended settings, unlike the capture SDK's
//! [`decipipe_capture::CaptureConfig::from_env`], which degrades instead,
//! since a misconfigured SDK must never stop the host application. Ports
//! and poll intervals still take documented defaults when unset; only
//! genuinely required fields (queue/store locations) are mandatory.

mod env;
mod queue;
mod store;

pub use env::ConfigError;
pub use queue::QueueConfig;
pub use store::AnalyticalConfig;
pub use store::BlobConfig;

use env::env_u16;
use env::env_u64;
use env::env_usize;

const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_BATCH_SIZE: usize = 10;

/// Configuration for the ingestion HTTP service (C6).
#[derive(Debug, Clone)]
pub struct IngestionConfig {
    /// Port the `/ingest` and `/health` HTTP server binds.
    pub port: u16,
    /// Where validated envelopes are enqueued.
    pub queue: QueueConfig,
}

impl IngestionConfig {
    /// Loads ingestion configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required variable is missing or a
    /// present one fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            port: env_u16("PORT")?.unwrap_or(4000),
            queue: QueueConfig::from_env()?,
        })
    }
}

/// Configuration for the processor worker (C7).
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Maximum messages polled per batch.
    pub batch_size: usize,
    /// Delay between polls when the queue is empty.
    pub poll_interval_ms: u64,
    /// Where messages are polled from.
    pub queue: QueueConfig,
    /// The analytical store to write aggregates into.
    pub analytical: AnalyticalConfig,
    /// The blob store to write raw payloads into.
    pub blob: BlobConfig,
}

impl ProcessorConfig {
    /// Loads processor configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required variable is missing or a
    /// present one fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            batch_size: env_usize("BATCH_SIZE")?.unwrap_or(DEFAULT_BATCH_SIZE),
            poll_interval_ms: env_u64("POLL_INTERVAL_MS")?.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            queue: QueueConfig::from_env()?,
            analytical: AnalyticalConfig::from_env()?,
            blob: BlobConfig::from_env()?,
        })
    }
}

/// Configuration for the query HTTP service (C10).
#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// Port the query HTTP server binds.
    pub port: u16,
    /// The analytical store queries read from.
    pub analytical: AnalyticalConfig,
    /// The blob store opt-in hydration reads from.
    pub blob: BlobConfig,
}

impl QueryConfig {
    /// Loads query-service configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required variable is missing or a
    /// present one fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            port: env_u16("PORT")?.unwrap_or(4100),
            analytical: AnalyticalConfig::from_env()?,
            blob: BlobConfig::from_env()?,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        unsafe_code,
        clippy::expect_used,
        clippy::unwrap_used,
        reason = "Tests serialize env var mutation under a lock and use expect/unwrap for clarity."
    )]

    use std::sync::Mutex;

    use super::*;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_ingestion_vars() {
        for key in ["PORT", "QUEUE_TYPE", "QUEUE_URL", "BROKER_URL"] {
            // SAFETY: tests run serialized under `ENV_LOCK`.
            unsafe { std::env::remove_var(key) };
        }
    }

    #[test]
    fn ingestion_defaults_to_memory_queue_and_port_4000() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_ingestion_vars();
        let config = IngestionConfig::from_env().unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.queue, QueueConfig::Memory);
    }

    #[test]
    fn unknown_queue_type_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_ingestion_vars();
        // SAFETY: tests run serialized under `ENV_LOCK`.
        unsafe { std::env::set_var("QUEUE_TYPE", "bogus") };
        let result = IngestionConfig::from_env();
        assert!(result.is_err());
        clear_ingestion_vars();
    }
}
