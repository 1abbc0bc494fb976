//! Bucket-backed image cache keyed by comic number
//!
//! Writes are idempotent overwrites. The bucket is verified lazily on the
//! first save and never created by the cache itself.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::domain::{ObjectStore, ObjectStoreError, image_key};
use crate::infrastructure::bucket_gate::BucketGate;
use crate::infrastructure::content_type::ContentTypeDetector;

#[derive(Error, Debug, Clone)]
pub enum CacheError {
    #[error("Bucket '{bucket}' does not exist; create it through the storage admin interface")]
    BucketMissing { bucket: String },

    #[error("Failed to verify bucket '{bucket}': {message}")]
    BucketCheck { bucket: String, message: String },

    #[error("Failed to store image '{key}': {message}")]
    Put { key: String, message: String },

    #[error("Failed to delete image '{key}': {message}")]
    Delete { key: String, message: String },

    #[error("Failed to presign URL for '{key}': {message}")]
    Presign { key: String, message: String },
}

impl CacheError {
    /// Bucket problems are configuration errors and fail every save
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::BucketMissing { .. } | Self::BucketCheck { .. })
    }
}

pub struct ImageCache {
    store: Arc<dyn ObjectStore>,
    detector: ContentTypeDetector,
    bucket_gate: BucketGate,
    presign_expiry: Duration,
}

impl ImageCache {
    pub fn new(store: Arc<dyn ObjectStore>, detector: ContentTypeDetector, presign_expiry: Duration) -> Self {
        Self {
            store,
            detector,
            bucket_gate: BucketGate::new(),
            presign_expiry,
        }
    }

    pub fn detector(&self) -> &ContentTypeDetector {
        &self.detector
    }

    /// Store `content` under `key`, overwriting any previous value.
    pub async fn save(&self, key: &str, content: Bytes, content_type: Option<&str>) -> Result<String, CacheError> {
        self.ensure_bucket_exists().await?;

        let detected = self.detector.detect(&content, content_type, key);
        self.store
            .put_object(key, content, &detected)
            .await
            .map_err(|e| CacheError::Put {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        debug!(
            "Stored image '{}' in bucket '{}' with content type '{}'",
            key,
            self.store.bucket(),
            detected
        );
        Ok(key.to_string())
    }

    pub async fn save_default(&self, key: &str, content: Bytes) -> Result<String, CacheError> {
        self.save(key, content, None).await
    }

    /// Metadata-only lookup; every failure reads as "absent"
    pub async fn exists(&self, key: &str) -> bool {
        match self.store.head_object(key).await {
            Ok(size) => size > 0,
            Err(ObjectStoreError::NotFound(_)) => false,
            Err(e) => {
                warn!("Failed to check if object exists '{}': {}", key, e);
                false
            }
        }
    }

    pub async fn image_exists_for_comic(&self, comic_number: i32) -> bool {
        self.exists(&image_key(comic_number)).await
    }

    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.store.delete_object(key).await.map_err(|e| {
            error!("Failed to delete image '{}' from bucket '{}': {}", key, self.store.bucket(), e);
            CacheError::Delete {
                key: key.to_string(),
                message: e.to_string(),
            }
        })?;

        debug!("Deleted image '{}' from bucket '{}'", key, self.store.bucket());
        Ok(())
    }

    /// Presigned GET URL, or a direct URL when presigning fails
    pub async fn url(&self, key: &str) -> String {
        match self.presigned_url(key).await {
            Ok(url) => url,
            Err(e) => {
                warn!("{}", e);
                self.direct_url(key)
            }
        }
    }

    pub async fn presigned_url(&self, key: &str) -> Result<String, CacheError> {
        self.store
            .presign_get(key, self.presign_expiry)
            .await
            .map_err(|e| CacheError::Presign {
                key: key.to_string(),
                message: e.to_string(),
            })
    }

    pub fn direct_url(&self, key: &str) -> String {
        match self.store.endpoint().map(str::trim).filter(|e| !e.is_empty()) {
            Some(endpoint) => format!("{}/{}/{}", endpoint.trim_end_matches('/'), self.store.bucket(), key),
            None => key.to_string(),
        }
    }

    async fn ensure_bucket_exists(&self) -> Result<(), CacheError> {
        let bucket = self.store.bucket();
        self.bucket_gate
            .ensure(|| async {
                match self.store.bucket_exists().await {
                    Ok(true) => {
                        debug!("Bucket '{}' exists and is ready for use", bucket);
                        Ok(())
                    }
                    Ok(false) => {
                        let err = CacheError::BucketMissing {
                            bucket: bucket.to_string(),
                        };
                        error!("{}", err);
                        Err(err)
                    }
                    Err(e) => {
                        let err = CacheError::BucketCheck {
                            bucket: bucket.to_string(),
                            message: e.to_string(),
                        };
                        error!("{}", err);
                        Err(err)
                    }
                }
            })
            .await
    }
}
