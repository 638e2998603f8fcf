// crates/decipipe-capture/src/config.rs
// ============================================================================
// Module: Capture Configuration
// Description: Typed configuration for the buffer, transport, and sampler,
//              with environment-variable loading.
// Purpose: Give integrators one struct to build by hand or populate from
//          environment variables.
// Dependencies: decipipe-sampler, std::env
// ============================================================================

use std::env;
use std::time::Duration;

use decipipe_sampler::CaptureLevel;

/// Configuration for [`crate::facade::CaptureClient`].
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Ingestion collector base URL, e.g. `http://localhost:4000`.
    pub ingestion_url: String,
    /// How aggressively to capture decision events.
    pub capture_level: CaptureLevel,
    /// Event buffer bound and flush triggers.
    pub buffer: BufferConfig,
    /// Transport retry and timeout behavior.
    pub transport: TransportConfig,
}

/// Configuration for the event buffer (C3).
#[derive(Debug, Clone, Copy)]
pub struct BufferConfig {
    /// Maximum number of buffered events before the oldest is dropped.
    pub max_size: usize,
    /// Size at which a flush is scheduled.
    pub batch_size: usize,
    /// Interval between unconditional periodic flushes.
    pub flush_interval: Duration,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            batch_size: 100,
            flush_interval: Duration::from_millis(5000),
        }
    }
}

/// Configuration for the retrying transport (C4).
#[derive(Debug, Clone, Copy)]
pub struct TransportConfig {
    /// Maximum delivery attempts per batch.
    pub max_retries: u32,
    /// Base delay for exponential backoff between attempts.
    pub retry_delay: Duration,
    /// Per-attempt timeout.
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(200),
            timeout: Duration::from_secs(5),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            ingestion_url: "http://localhost:4000".to_string(),
            capture_level: CaptureLevel::Sampled,
            buffer: BufferConfig::default(),
            transport: TransportConfig::default(),
        }
    }
}

impl CaptureConfig {
    /// Builds a configuration from the recognised environment variables:
    /// `CAPTURE_LEVEL`, `INGESTION_URL`, `BUFFER_MAX_SIZE`,
    /// `BUFFER_BATCH_SIZE`, `BUFFER_FLUSH_MS`, `TRANSPORT_TIMEOUT_MS`,
    /// `TRANSPORT_MAX_RETRIES`, `TRANSPORT_RETRY_DELAY_MS`.
    /// Unset variables fall back to the documented defaults; malformed
    /// values also fall back, since a misconfigured SDK must never cause
    /// the application to fail to start.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ingestion_url: env::var("INGESTION_URL").unwrap_or(defaults.ingestion_url),
            capture_level: env::var("CAPTURE_LEVEL")
                .ok()
                .and_then(|value| parse_capture_level(&value))
                .unwrap_or(defaults.capture_level),
            buffer: BufferConfig {
                max_size: env_usize("BUFFER_MAX_SIZE").unwrap_or(defaults.buffer.max_size),
                batch_size: env_usize("BUFFER_BATCH_SIZE").unwrap_or(defaults.buffer.batch_size),
                flush_interval: env_millis("BUFFER_FLUSH_MS")
                    .unwrap_or(defaults.buffer.flush_interval),
            },
            transport: TransportConfig {
                max_retries: env_u32("TRANSPORT_MAX_RETRIES")
                    .unwrap_or(defaults.transport.max_retries),
                retry_delay: env_millis("TRANSPORT_RETRY_DELAY_MS")
                    .unwrap_or(defaults.transport.retry_delay),
                timeout: env_millis("TRANSPORT_TIMEOUT_MS").unwrap_or(defaults.transport.timeout),
            },
        }
    }
}

fn parse_capture_level(value: &str) -> Option<CaptureLevel> {
    match value {
        "metrics_only" => Some(CaptureLevel::MetricsOnly),
        "sampled" => Some(CaptureLevel::Sampled),
        "full" => Some(CaptureLevel::Full),
        _ => None,
    }
}

fn env_usize(key: &str) -> Option<usize> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

fn env_millis(key: &str) -> Option<Duration> {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .map(Duration::from_millis)
}
