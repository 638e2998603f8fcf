// crates/decipipe-config/src/queue.rs
// ============================================================================
// Module: Queue Configuration
// Description: Selects and configures the queue adapter from QUEUE_TYPE.
// Purpose: One variant per decipipe-queue adapter.
// ============================================================================

use std::path::PathBuf;

use crate::env::ConfigError;
use crate::env::optional;
use crate::env::required;

/// Which queue adapter a service should construct, and with what.
///
/// Maps onto the adapters already implemented in `decipipe-queue`: an
/// in-process `MemoryQueue`, an `HttpQueue` fronting a broker reachable over
/// HTTP, and a `DurableFileQueue` persisting to a local directory (the
/// workspace's stand-in for a durable external broker — see `DESIGN.md`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueConfig {
    /// In-process queue; state is lost on restart. The default when
    /// `QUEUE_TYPE` is unset, matching single-process development and tests.
    Memory,
    /// A broker reachable over HTTP at `base_url`.
    Http {
        /// Base URL of the broker's HTTP endpoint.
        base_url: String,
    },
    /// A durable, file-backed queue rooted at `directory`.
    Broker {
        /// Directory the queue persists its messages under.
        directory: PathBuf,
    },
}

impl QueueConfig {
    /// Loads queue configuration from `QUEUE_TYPE`/`QUEUE_URL`/`BROKER_URL`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `QUEUE_TYPE` names an unrecognised
    /// adapter, or when the adapter it names is missing its companion
    /// variable (`QUEUE_URL` for `http`, `BROKER_URL` for `broker`).
    pub fn from_env() -> Result<Self, ConfigError> {
        match optional("QUEUE_TYPE").as_deref() {
            None | Some("memory") => Ok(Self::Memory),
            Some("http") => Ok(Self::Http { base_url: required("QUEUE_URL")? }),
            Some("broker") => Ok(Self::Broker { directory: PathBuf::from(required("BROKER_URL")?) }),
            Some(other) => Err(ConfigError::Invalid {
                key: "QUEUE_TYPE".to_string(),
                value: other.to_string(),
                reason: "expected one of `memory`, `http`, `broker`".to_string(),
            }),
        }
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

    fn clear() {
        for key in ["QUEUE_TYPE", "QUEUE_URL", "BROKER_URL"] {
            // SAFETY: tests run serialized under `ENV_LOCK`.
            unsafe { std::env::remove_var(key) };
        }
    }

    #[test]
    fn unset_queue_type_defaults_to_memory() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear();
        assert_eq!(QueueConfig::from_env().unwrap(), QueueConfig::Memory);
    }

    #[test]
    fn http_queue_type_requires_queue_url() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear();
        // SAFETY: tests run serialized under `ENV_LOCK`.
        unsafe { std::env::set_var("QUEUE_TYPE", "http") };
        assert!(QueueConfig::from_env().is_err());
        // SAFETY: tests run serialized under `ENV_LOCK`.
        unsafe { std::env::set_var("QUEUE_URL", "http://broker.local:9000") };
        assert_eq!(
            QueueConfig::from_env().unwrap(),
            QueueConfig::Http { base_url: "http://broker.local:9000".to_string() }
        );
        clear();
    }

    #[test]
    fn broker_queue_type_requires_broker_url() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear();
        // SAFETY: tests run serialized under `ENV_LOCK`.
        unsafe { std::env::set_var("QUEUE_TYPE", "broker") };
        // SAFETY: tests run serialized under `ENV_LOCK`.
        unsafe { std::env::set_var("BROKER_URL", "/var/lib/decipipe/queue") };
        assert_eq!(
            QueueConfig::from_env().unwrap(),
            QueueConfig::Broker { directory: PathBuf::from("/var/lib/decipipe/queue") }
        );
        clear();
    }
}
