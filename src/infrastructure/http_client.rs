//! Rate-limited HTTP client shared by the comic and image clients
//!
//! Every request waits on a process-wide token bucket so concurrent batch
//! fetches stay polite towards the remote archive.

use anyhow::{Context, Result};
use bytes::Bytes;
use governor::{Quota, RateLimiter, clock::DefaultClock, state::{InMemoryState, direct::NotKeyed}};
use reqwest::{Client, Response, header::{HeaderMap, HeaderValue, USER_AGENT}};
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::time::Duration;

use crate::domain::ClientError;
use crate::infrastructure::config::HttpConfig;

pub struct HttpClient {
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl HttpClient {
    pub fn new(config: HttpConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).context("Invalid user agent")?,
        );

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .timeout(Duration::from_secs(config.response_timeout_seconds))
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .default_headers(headers)
            .redirect(if config.follow_redirects {
                reqwest::redirect::Policy::limited(config.max_redirects)
            } else {
                reqwest::redirect::Policy::none()
            })
            .build()
            .context("Failed to create HTTP client")?;

        let quota = Quota::per_second(
            NonZeroU32::new(config.max_requests_per_second).context("Rate limit must be greater than 0")?,
        );

        Ok(Self {
            client,
            rate_limiter: RateLimiter::direct(quota),
        })
    }

    /// GET a URL, mapping non-2xx statuses to `ClientError::Http`
    pub async fn get(&self, url: &str) -> Result<Response, ClientError> {
        self.rate_limiter.until_ready().await;

        tracing::debug!("Fetching URL: {}", url);

        let response = self.client.get(url).send().await.map_err(|e| ClientError::Request {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ClientError> {
        let response = self.get(url).await?;
        response.json::<T>().await.map_err(|e| ClientError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    pub async fn get_bytes(&self, url: &str) -> Result<Bytes, ClientError> {
        let response = self.get(url).await?;
        let body = response.bytes().await.map_err(|e| ClientError::Request {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        tracing::debug!("Fetched {} bytes from {}", body.len(), url);
        Ok(body)
    }
}
