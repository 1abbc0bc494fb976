//! Ports to the external collaborators of the sync pipeline
//!
//! The remote archive, the image host and the object store are reached
//! through these traits so the orchestrator can run against in-memory fakes.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

use crate::domain::xkcd_record::XkcdRecord;

/// Remote client failures; always per-item from the orchestrator's view
#[derive(Error, Debug, Clone)]
pub enum ClientError {
    #[error("HTTP error {status}: {url}")]
    Http { status: u16, url: String },

    #[error("Request failed for {url}: {message}")]
    Request { url: String, message: String },

    #[error("Failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Raw object store failures
#[derive(Error, Debug, Clone)]
pub enum ObjectStoreError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Object store error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait ComicSource: Send + Sync {
    async fn get_latest(&self) -> Result<XkcdRecord, ClientError>;
    async fn get_by_id(&self, comic_id: i32) -> Result<XkcdRecord, ClientError>;
}

#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Fetch image bytes for a file name relative to the image host's comics path
    async fn fetch(&self, file_name: &str) -> Result<Bytes, ClientError>;
}

/// Bucket-scoped object storage (S3-compatible)
#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn bucket(&self) -> &str;

    /// Base endpoint used to compose direct URLs, if any
    fn endpoint(&self) -> Option<&str>;

    async fn bucket_exists(&self) -> Result<bool, ObjectStoreError>;
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), ObjectStoreError>;

    /// Metadata lookup; returns the object size
    async fn head_object(&self, key: &str) -> Result<u64, ObjectStoreError>;
    async fn delete_object(&self, key: &str) -> Result<(), ObjectStoreError>;
    async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String, ObjectStoreError>;
}
