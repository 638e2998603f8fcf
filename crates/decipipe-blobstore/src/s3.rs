// crates/decipipe-blobstore/src/s3.rs
// ============================================================================
// Module: S3 Blob Store
// Description: S3-compatible BlobStore, async end to end.
// Purpose: Production backend for decision/run/step payloads.
// Dependencies: aws-sdk-s3, aws-config
// ============================================================================

//! ## Overview
//! Same config shape (bucket/region/prefix/endpoint/force-path-style) and
//! the same existence-check-then-put idempotency strategy as a
//! tar-archive S3 runpack store, adapted here to flat key/value payloads
//! and driven on the caller's own async runtime rather than a
//! store-owned [`tokio::runtime::Runtime`], since every caller in this
//! workspace is already async.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::primitives::ByteStream;

use crate::BlobMetadata;
use crate::BlobStore;
use crate::BlobStoreError;

/// Configuration for [`S3BlobStore`].
#[derive(Debug, Clone)]
pub struct S3BlobStoreConfig {
    /// Bucket name.
    pub bucket: String,
    /// AWS region; falls back to the ambient AWS configuration if unset.
    pub region: Option<String>,
    /// Optional key prefix applied to every object.
    pub prefix: Option<String>,
    /// Custom endpoint URL, for S3-compatible stores (e.g. MinIO).
    pub endpoint: Option<String>,
    /// Force path-style addressing, required by most S3-compatible stores.
    pub force_path_style: bool,
}

/// S3-compatible [`BlobStore`].
pub struct S3BlobStore {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3BlobStore {
    /// Builds the client, normalizes the prefix, and ensures the bucket
    /// exists (creating it if this backend's credentials permit it).
    ///
    /// # Errors
    ///
    /// Returns [`BlobStoreError::Invalid`] for a blank bucket name, or
    /// [`BlobStoreError::Backend`] if the bucket cannot be created.
    pub async fn new(config: S3BlobStoreConfig) -> Result<Self, BlobStoreError> {
        if config.bucket.trim().is_empty() {
            return Err(BlobStoreError::Invalid("bucket must be set".to_string()));
        }
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared_config = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared_config);
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }
        let client = Client::from_conf(builder.build());
        let prefix = normalize_prefix(config.prefix.as_deref());

        let store = Self {
            client,
            bucket: config.bucket,
            prefix,
        };
        store.ensure_bucket().await?;
        Ok(store)
    }

    async fn ensure_bucket(&self) -> Result<(), BlobStoreError> {
        let head = self.client.head_bucket().bucket(&self.bucket).send().await;
        if head.is_ok() {
            return Ok(());
        }
        self.client
            .create_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map(|_| ())
            .or_else(|err| {
                // Another process may have created it between the head and
                // create calls, or the backend may not support create_bucket
                // (common for restricted-permission deployments); either way
                // a subsequent get/put will surface a real error if the
                // bucket genuinely does not exist.
                tracing::debug!(error = %err, bucket = %self.bucket, "bucket creation skipped");
                Ok::<(), BlobStoreError>(())
            })
    }

    fn object_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, key: &str, payload: Vec<u8>, metadata: BlobMetadata) -> Result<(), BlobStoreError> {
        let object_key = self.object_key(key);
        match self.client.head_object().bucket(&self.bucket).key(&object_key).send().await {
            Ok(_) => return Ok(()),
            Err(SdkError::ServiceError(service_err))
                if matches!(service_err.err(), HeadObjectError::NotFound(_)) => {}
            Err(_) => {
                // Treat an inconclusive existence check as "not present" and
                // let the put itself be the source of truth.
            }
        }

        let mut headers = HashMap::new();
        if let Some(event_id) = metadata.event_id {
            headers.insert("eventId".to_string(), event_id);
        }
        if let Some(run_id) = metadata.run_id {
            headers.insert("runId".to_string(), run_id);
        }
        if let Some(step_id) = metadata.step_id {
            headers.insert("stepId".to_string(), step_id);
        }

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .body(ByteStream::from(payload))
            .content_type("application/json")
            .set_metadata(Some(headers))
            .send()
            .await
            .map_err(|err| BlobStoreError::Backend(err.to_string()))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobStoreError> {
        let object_key = self.object_key(key);
        let response = self.client.get_object().bucket(&self.bucket).key(&object_key).send().await;
        let output = match response {
            Ok(output) => output,
            Err(SdkError::ServiceError(service_err))
                if matches!(service_err.err(), GetObjectError::NoSuchKey(_)) =>
            {
                return Ok(None);
            }
            Err(err) => return Err(BlobStoreError::Backend(err.to_string())),
        };
        let bytes = output
            .body
            .collect()
            .await
            .map_err(|err| BlobStoreError::Backend(err.to_string()))?
            .into_bytes();
        Ok(Some(bytes.to_vec()))
    }
}

fn normalize_prefix(prefix: Option<&str>) -> String {
    let Some(prefix) = prefix else {
        return String::new();
    };
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}
