//! xkcd-sync - incremental xkcd archive mirror
//!
//! Pulls new comics from the xkcd JSON archive into a SQLite store and caches
//! their images in an S3-compatible bucket.

// Module declarations
pub mod application;
pub mod domain;
pub mod infrastructure;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::application::{ComicSyncService, SyncScheduler};
use crate::infrastructure::{
    AppConfig, ContentTypeDetector, DatabaseConnection, HttpClient, ImageCache, S3ObjectStore, SqliteComicRepository,
    XkcdClient, XkcdImageClient,
};

/// Wire the production components from configuration.
pub async fn build_sync_service(config: &AppConfig) -> Result<ComicSyncService> {
    let database = DatabaseConnection::new(&config.database.url, config.database.max_connections).await?;
    database.migrate().await.context("Failed to bootstrap database schema")?;

    let http = Arc::new(HttpClient::new(config.http.clone())?);
    let store = Arc::new(S3ObjectStore::from_config(&config.storage).await);
    let cache = Arc::new(ImageCache::new(
        store,
        ContentTypeDetector::new(),
        Duration::from_secs(config.storage.presign_expiry_seconds),
    ));

    Ok(ComicSyncService::new(
        Arc::new(SqliteComicRepository::new(database.pool().clone())),
        Arc::new(XkcdClient::new(Arc::clone(&http), &config.xkcd.comic_base_url)),
        Arc::new(XkcdImageClient::new(http, &config.xkcd.image_base_url)),
        cache,
        config.xkcd.excluded_comic_numbers.clone(),
        config.xkcd.batch_size,
    ))
}

/// Run the scheduler until `cancel` fires.
pub async fn run(config: AppConfig, cancel: CancellationToken) -> Result<()> {
    let service = Arc::new(build_sync_service(&config).await?);

    let scheduler = SyncScheduler::new(
        service,
        config.xkcd.scheduler.initial_delay(),
        config.xkcd.scheduler.interval(),
    );
    scheduler.run(cancel).await;

    info!("xkcd-sync shut down");
    Ok(())
}

/// Run a single sync job and return.
pub async fn run_once(config: AppConfig) -> Result<()> {
    let service = build_sync_service(&config).await?;
    service.run_job().await;
    Ok(())
}
