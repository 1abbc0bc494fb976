//! Clients for the xkcd JSON archive and its image host

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tracing::debug;

use crate::domain::comic::COMICS_PATH_MARKER;
use crate::domain::{ClientError, ComicSource, ImageSource, XkcdRecord};
use crate::infrastructure::http_client::HttpClient;

const INFO_DOCUMENT: &str = "info.0.json";

/// Reads `info.0.json` records from the remote archive
pub struct XkcdClient {
    http: Arc<HttpClient>,
    base_url: String,
}

impl XkcdClient {
    pub fn new(http: Arc<HttpClient>, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn latest_url(&self) -> String {
        format!("{}/{INFO_DOCUMENT}", self.base_url)
    }

    pub fn comic_url(&self, comic_id: i32) -> String {
        format!("{}/{comic_id}/{INFO_DOCUMENT}", self.base_url)
    }
}

#[async_trait]
impl ComicSource for XkcdClient {
    async fn get_latest(&self) -> Result<XkcdRecord, ClientError> {
        self.http.get_json(&self.latest_url()).await
    }

    async fn get_by_id(&self, comic_id: i32) -> Result<XkcdRecord, ClientError> {
        let record: XkcdRecord = self.http.get_json(&self.comic_url(comic_id)).await?;
        debug!("Fetched comic {}: {}", comic_id, record.title);
        Ok(record)
    }
}

/// Downloads image bytes from the image host's comics path
pub struct XkcdImageClient {
    http: Arc<HttpClient>,
    base_url: String,
}

impl XkcdImageClient {
    pub fn new(http: Arc<HttpClient>, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn image_url(&self, file_name: &str) -> Result<String, ClientError> {
        let file_name = file_name.trim().trim_start_matches('/');
        if file_name.is_empty() {
            return Err(ClientError::InvalidUrl(format!("{}{COMICS_PATH_MARKER}", self.base_url)));
        }

        let url = format!("{}{COMICS_PATH_MARKER}{file_name}", self.base_url);
        url::Url::parse(&url).map_err(|e| ClientError::InvalidUrl(format!("{url}: {e}")))?;
        Ok(url)
    }
}

#[async_trait]
impl ImageSource for XkcdImageClient {
    async fn fetch(&self, file_name: &str) -> Result<Bytes, ClientError> {
        let url = self.image_url(file_name)?;
        self.http.get_bytes(&url).await
    }
}
