// crates/decipipe-blobstore/src/lib.rs
// ============================================================================
// Crate: decipipe-blobstore
// Description: Content-addressed blob storage behind one trait (C8).
// Purpose: Give the processor worker one idempotent put/get contract
//          regardless of whether decisions land on local disk or in S3.
// ============================================================================

//! ## Overview
//! [`BlobStore`] is deliberately narrow: `put` is idempotent (an
//! existence check before writing), `get` returns `None` rather than an
//! error for a missing key, and the blob key itself — already
//! date-partitioned by [`decipipe_model::DecisionEvent::blob_key`] and its
//! `Run`/`Step` equivalents — carries all addressing information. Two
//! implementations are provided: [`local::LocalFsBlobStore`] for tests and
//! local/dev runs, and [`s3::S3BlobStore`] for production, grounded on the
//! teacher's enterprise `S3RunpackStore`.

pub mod local;
pub mod s3;

use async_trait::async_trait;

pub use local::LocalFsBlobStore;
pub use s3::S3BlobStore;
pub use s3::S3BlobStoreConfig;

/// Errors a [`BlobStore`] implementation may return.
#[derive(Debug, thiserror::Error)]
pub enum BlobStoreError {
    /// Local filesystem I/O failed.
    #[error("blob store io error: {0}")]
    Io(String),
    /// The S3-compatible backend returned an error.
    #[error("blob store backend error: {0}")]
    Backend(String),
    /// The store configuration was invalid.
    #[error("invalid blob store configuration: {0}")]
    Invalid(String),
}

/// Headers attached to a stored object, in the tagging style of
/// `sha256`/tenant metadata attached on object put.
#[derive(Debug, Clone, Default)]
pub struct BlobMetadata {
    /// The decision event id, when storing a decision payload.
    pub event_id: Option<String>,
    /// The owning run id.
    pub run_id: Option<String>,
    /// The owning step id, when storing a step payload.
    pub step_id: Option<String>,
}

/// Content-addressed, idempotent blob storage.
///
/// # Invariants
/// - `put` with an already-present key is a no-op that still returns `Ok`.
/// - `get` returns `Ok(None)` for a missing key, never an error.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Writes `payload` under `key` unless it is already present.
    ///
    /// # Errors
    ///
    /// Returns [`BlobStoreError`] when the write itself fails (not when the
    /// key already exists — that case is a successful no-op).
    async fn put(&self, key: &str, payload: Vec<u8>, metadata: BlobMetadata) -> Result<(), BlobStoreError>;

    /// Reads the payload stored at `key`, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`BlobStoreError`] when the read fails for a reason other
    /// than the key being absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobStoreError>;

    /// Convenience wrapper storing a JSON value at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`BlobStoreError`] on serialization or write failure.
    async fn put_json(
        &self,
        key: &str,
        value: &serde_json::Value,
        metadata: BlobMetadata,
    ) -> Result<(), BlobStoreError> {
        let payload = serde_json::to_vec(value).map_err(|err| BlobStoreError::Invalid(err.to_string()))?;
        self.put(key, payload, metadata).await
    }
}
