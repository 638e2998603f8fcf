// crates/decipipe-config/src/store.rs
// ============================================================================
// Module: Analytical and Blob Store Configuration
// Description: Selects and configures the analytical store and blob store.
// Purpose: Maps the ANALYTICAL_*/BLOB_* keys onto the backends
//          decipipe-analytics and decipipe-blobstore actually implement.
// ============================================================================

use std::path::PathBuf;

use crate::env::ConfigError;
use crate::env::optional;

/// Configuration for the analytical store.
///
/// The recognised keys are `ANALYTICAL_HOST`/`ANALYTICAL_PORT`/
/// `ANALYTICAL_DATABASE`/`ANALYTICAL_USER`/`ANALYTICAL_PASSWORD`, a shape
/// that presumes a hosted SQL server. `decipipe-analytics` is file-based
/// SQLite, so `ANALYTICAL_HOST` is read as a filesystem path rather than a
/// network address and the user/password/port keys are accepted but
/// unused; see `DESIGN.md`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyticalConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,
}

impl AnalyticalConfig {
    /// Loads analytical-store configuration from the environment.
    ///
    /// Reads `ANALYTICAL_DATABASE` if set, falling back to `ANALYTICAL_HOST`
    /// for compatibility with the documented key name, and finally to a
    /// documented default path.
    ///
    /// # Errors
    ///
    /// This loader cannot currently fail; it returns `Result` for symmetry
    /// with the other loaders and so a future validation (e.g. parent
    /// directory existence) can be added without breaking callers.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = optional("ANALYTICAL_DATABASE")
            .or_else(|| optional("ANALYTICAL_HOST"))
            .unwrap_or_else(|| "decipipe-analytics.sqlite3".to_string());
        Ok(Self { database_path: PathBuf::from(path) })
    }
}

/// Which blob store backend a service should construct, and with what.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobConfig {
    /// Local filesystem store rooted at `root`.
    Local {
        /// Directory blobs are written under.
        root: PathBuf,
    },
    /// S3-compatible object store.
    S3 {
        /// Bucket name.
        bucket: String,
        /// AWS region, when the bucket is hosted on AWS S3 itself.
        region: Option<String>,
        /// Custom endpoint, for S3-compatible stores (e.g. MinIO).
        endpoint: Option<String>,
        /// Key prefix applied to every object.
        prefix: Option<String>,
        /// Whether to address objects path-style rather than virtual-hosted.
        force_path_style: bool,
    },
}

impl BlobConfig {
    /// Loads blob-store configuration from the environment.
    ///
    /// Presence of `BLOB_BUCKET` selects the S3 backend; its absence falls
    /// back to a local-filesystem store rooted at `BLOB_ROOT` (or a
    /// documented default). See `DESIGN.md` for the reasoning behind this
    /// selection rule.
    ///
    /// # Errors
    ///
    /// This loader cannot currently fail; it returns `Result` for symmetry
    /// with the other loaders.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Some(bucket) = optional("BLOB_BUCKET") {
            return Ok(Self::S3 {
                bucket,
                region: optional("BLOB_REGION"),
                endpoint: optional("BLOB_ENDPOINT"),
                prefix: optional("BLOB_PREFIX"),
                force_path_style: optional("BLOB_FORCE_PATH_STYLE").as_deref() == Some("true"),
            });
        }
        let root = optional("BLOB_ROOT").unwrap_or_else(|| "decipipe-blobs".to_string());
        Ok(Self::Local { root: PathBuf::from(root) })
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
        for key in [
            "ANALYTICAL_DATABASE",
            "ANALYTICAL_HOST",
            "BLOB_BUCKET",
            "BLOB_REGION",
            "BLOB_ENDPOINT",
            "BLOB_PREFIX",
            "BLOB_FORCE_PATH_STYLE",
            "BLOB_ROOT",
        ] {
            // SAFETY: tests run serialized under `ENV_LOCK`.
            unsafe { std::env::remove_var(key) };
        }
    }

    #[test]
    fn analytical_config_defaults_to_a_local_sqlite_file() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear();
        let config = AnalyticalConfig::from_env().unwrap();
        assert_eq!(config.database_path, PathBuf::from("decipipe-analytics.sqlite3"));
        clear();
    }

    #[test]
    fn blob_config_without_bucket_is_local() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear();
        assert_eq!(BlobConfig::from_env().unwrap(), BlobConfig::Local { root: PathBuf::from("decipipe-blobs") });
        clear();
    }

    #[test]
    fn blob_config_with_bucket_is_s3() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear();
        // SAFETY: tests run serialized under `ENV_LOCK`.
        unsafe { std::env::set_var("BLOB_BUCKET", "decipipe-events") };
        let config = BlobConfig::from_env().unwrap();
        assert_eq!(
            config,
            BlobConfig::S3 {
                bucket: "decipipe-events".to_string(),
                region: None,
                endpoint: None,
                prefix: None,
                force_path_style: false,
            }
        );
        clear();
    }
}
