//! S3-compatible object store adapter (Garage, MinIO, AWS)

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use std::time::Duration;
use tracing::info;

use crate::domain::{ObjectStore, ObjectStoreError};
use crate::infrastructure::config::StorageConfig;

const CREDENTIALS_PROVIDER_NAME: &str = "xkcd-sync-config";

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    endpoint: Option<String>,
}

impl S3ObjectStore {
    /// Build a client from storage settings.
    ///
    /// Blank credentials defer to the SDK's default provider chain.
    pub async fn from_config(config: &StorageConfig) -> Self {
        let endpoint = Some(config.endpoint.trim().trim_end_matches('/').to_string()).filter(|e| !e.is_empty());

        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));
        if let Some(endpoint) = &endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        if !config.credentials.access_key.is_empty() {
            loader = loader.credentials_provider(Credentials::new(
                config.credentials.access_key.clone(),
                config.credentials.secret_key.clone(),
                None,
                None,
                CREDENTIALS_PROVIDER_NAME,
            ));
        }
        let sdk_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.force_path_style)
            .build();

        info!(
            "Object store configured: bucket='{}', endpoint={:?}, path_style={}",
            config.bucket, endpoint, config.force_path_style
        );

        Self {
            client: Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
            endpoint,
        }
    }
}

fn is_not_found<E>(err: &SdkError<E, HttpResponse>) -> bool {
    err.raw_response().is_some_and(|raw| raw.status().as_u16() == 404)
}

fn backend_error<E, R>(err: SdkError<E, R>) -> ObjectStoreError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    ObjectStoreError::Backend(DisplayErrorContext(&err).to_string())
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    async fn bucket_exists(&self) -> Result<bool, ObjectStoreError> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) || is_not_found(&err) => Ok(false),
            Err(err) => Err(backend_error(err)),
        }
    }

    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), ObjectStoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(backend_error)?;
        Ok(())
    }

    async fn head_object(&self, key: &str) -> Result<u64, ObjectStoreError> {
        match self.client.head_object().bucket(&self.bucket).key(key).send().await {
            Ok(output) => Ok(output.content_length().unwrap_or_default().max(0) as u64),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) || is_not_found(&err) => {
                Err(ObjectStoreError::NotFound(key.to_string()))
            }
            Err(err) => Err(backend_error(err)),
        }
    }

    async fn delete_object(&self, key: &str) -> Result<(), ObjectStoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(backend_error)?;
        Ok(())
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String, ObjectStoreError> {
        let presigning = PresigningConfig::expires_in(expires_in)
            .map_err(|e| ObjectStoreError::Backend(format!("Invalid presign expiry: {e}")))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(backend_error)?;

        Ok(request.uri().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::StorageCredentials;

    fn garage_config() -> StorageConfig {
        StorageConfig {
            endpoint: "http://localhost:3900/".into(),
            bucket: "xkcd".into(),
            credentials: StorageCredentials {
                access_key: "GKtestaccess".into(),
                secret_key: "testsecret".into(),
            },
            ..StorageConfig::default()
        }
    }

    #[tokio::test]
    async fn exposes_bucket_and_endpoint() {
        let store = S3ObjectStore::from_config(&garage_config()).await;

        assert_eq!(store.bucket(), "xkcd");
        assert_eq!(store.endpoint(), Some("http://localhost:3900"));
    }

    #[tokio::test]
    async fn presigns_path_style_urls_offline() {
        let store = S3ObjectStore::from_config(&garage_config()).await;

        let url = store.presign_get("xkcd/614", Duration::from_secs(300)).await.unwrap();

        assert!(url.starts_with("http://localhost:3900/xkcd/xkcd/614?"), "unexpected url {url}");
        assert!(url.contains("X-Amz-Expires=300"));
    }
}
