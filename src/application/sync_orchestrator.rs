//! Incremental comic synchronization
//!
//! One cycle discovers the range `[highest stored + 1, latest remote]`, fetches
//! it in ascending batches with bounded concurrency, merges each batch into
//! the store, then caches the batch's images. Per-item and per-batch failures
//! are logged and absorbed; only a missing latest id aborts the cycle.

use anyhow::{Result, anyhow};
use futures::StreamExt;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, error, info, warn};

use crate::domain::comic::FIRST_COMIC_ID;
use crate::domain::{
    ComicRepository, ComicSource, ExcludedComics, FetchRange, ImageSource, XkcdRecord, extract_image_file_name,
    image_key,
};
use crate::infrastructure::image_cache::{CacheError, ImageCache};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Could not determine the latest comic id: {0}")]
    NoLatestId(String),

    #[error("A sync cycle is already running")]
    CycleInProgress,
}

/// Outcome of one sync cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub start_id: i32,
    pub latest_id: i32,
    /// Records fetched from the remote archive
    pub fetched: usize,
    /// Rows merged into the store
    pub persisted: usize,
    /// Ids whose fetch failed
    pub failed_ids: Vec<i32>,
    pub failed_batches: usize,
    pub images_cached: usize,
    pub images_failed: usize,
}

impl CycleReport {
    fn for_range(range: FetchRange) -> Self {
        Self {
            start_id: range.start_id,
            latest_id: range.latest_id,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub total: usize,
    pub excluded: usize,
    pub already_cached: usize,
    pub cached: usize,
    pub failed: usize,
}

/// A comic whose image should be fetched and cached
#[derive(Debug, Clone)]
struct ImageJob {
    comic_number: i32,
    img: String,
}

#[derive(Debug, Clone, Copy, Default)]
struct ImageOutcome {
    cached: usize,
    failed: usize,
}

pub struct ComicSyncService {
    repository: Arc<dyn ComicRepository>,
    comics: Arc<dyn ComicSource>,
    images: Arc<dyn ImageSource>,
    cache: Arc<ImageCache>,
    excluded: ExcludedComics,
    batch_size: usize,
    cycle_lock: Mutex<()>,
}

impl ComicSyncService {
    pub fn new(
        repository: Arc<dyn ComicRepository>,
        comics: Arc<dyn ComicSource>,
        images: Arc<dyn ImageSource>,
        cache: Arc<ImageCache>,
        excluded: ExcludedComics,
        batch_size: usize,
    ) -> Self {
        Self {
            repository,
            comics,
            images,
            cache,
            excluded,
            batch_size: batch_size.max(1),
            cycle_lock: Mutex::new(()),
        }
    }

    /// `max(1, highest stored + 1)`; a store failure restarts from the first comic
    pub async fn determine_start_id(&self) -> i32 {
        match self.repository.highest_comic_number().await {
            Ok(highest) => FetchRange::start_after(highest),
            Err(e) => {
                warn!("Failed to get highest saved comic number, starting from beginning: {:#}", e);
                FIRST_COMIC_ID
            }
        }
    }

    pub async fn get_latest_remote_id(&self) -> Result<i32, SyncError> {
        let latest = self.comics.get_latest().await.map_err(|e| {
            error!("Failed to fetch the latest comic: {}", e);
            SyncError::NoLatestId(e.to_string())
        })?;

        latest.num.ok_or_else(|| {
            error!("Latest comic record carries no comic number");
            SyncError::NoLatestId("latest record has no comic number".into())
        })
    }

    /// Run one synchronization pass. Refuses to overlap a running pass.
    pub async fn run_cycle(&self) -> Result<CycleReport, SyncError> {
        let _cycle = self.cycle_lock.try_lock().map_err(|_| SyncError::CycleInProgress)?;

        let start_id = self.determine_start_id().await;
        let latest_id = self.get_latest_remote_id().await?;
        let range = FetchRange::new(start_id, latest_id);
        let mut report = CycleReport::for_range(range);

        if range.is_empty() {
            info!("All comics are already up to date (latest {})", latest_id);
            return Ok(report);
        }

        info!("Fetching comics from {} to {}", start_id, latest_id);

        for batch in range.batches(self.batch_size, &self.excluded) {
            self.process_batch(&batch, &mut report).await;
        }

        info!(
            "Sync cycle finished: {} fetched, {} persisted, {} failed ids, {} images cached",
            report.fetched,
            report.persisted,
            report.failed_ids.len(),
            report.images_cached
        );
        Ok(report)
    }

    async fn process_batch(&self, batch: &[i32], report: &mut CycleReport) {
        let (Some(first), Some(last)) = (batch.first(), batch.last()) else {
            return;
        };
        debug!("Processing batch {}..={} ({} ids)", first, last, batch.len());

        let (records, failed_ids) = self.fetch_batch(batch).await;
        report.fetched += records.len();
        report.failed_ids.extend(failed_ids);

        if records.is_empty() {
            debug!("No comics fetched in batch {}..={}", first, last);
            return;
        }

        let new_comics: Vec<_> = records.iter().map(XkcdRecord::to_new_comic).collect();
        match self.repository.save_comics(&new_comics).await {
            Ok(saved) => {
                debug!("Batch {}..={} persisted; {} rows merged", first, last, saved.len());
                report.persisted += saved.len();
            }
            Err(e) => {
                error!("Failed to save batch {}..={} of {} comics: {:#}", first, last, records.len(), e);
                report.failed_batches += 1;
                return;
            }
        }

        let jobs = records
            .iter()
            .filter(|record| record.has_image())
            .filter_map(|record| {
                record.num.map(|comic_number| ImageJob {
                    comic_number,
                    img: record.img.clone(),
                })
            })
            .collect();

        let outcome = self.cache_images(jobs, "Cache").await;
        report.images_cached += outcome.cached;
        report.images_failed += outcome.failed;
    }

    /// Fetch every id concurrently; failures are logged and returned by id.
    async fn fetch_batch(&self, batch: &[i32]) -> (Vec<XkcdRecord>, Vec<i32>) {
        let semaphore = Arc::new(Semaphore::new(self.batch_size));

        let tasks: Vec<_> = batch
            .iter()
            .map(|&comic_id| {
                let source = Arc::clone(&self.comics);
                let semaphore = Arc::clone(&semaphore);
                tokio::spawn(async move {
                    let _permit = semaphore
                        .acquire()
                        .await
                        .map_err(|_| anyhow!("Semaphore acquisition failed"))?;
                    Ok::<_, anyhow::Error>(source.get_by_id(comic_id).await?)
                })
            })
            .collect();

        let results = join_all(tasks).await;

        let mut records = Vec::with_capacity(batch.len());
        let mut failed_ids = Vec::new();
        for (&comic_id, result) in batch.iter().zip(results) {
            match result {
                Ok(Ok(record)) => records.push(record),
                Ok(Err(e)) => {
                    warn!("Failed to fetch comic {}: {:#}", comic_id, e);
                    failed_ids.push(comic_id);
                }
                Err(e) => {
                    warn!("Fetch task for comic {} failed to join: {}", comic_id, e);
                    failed_ids.push(comic_id);
                }
            }
        }

        (records, failed_ids)
    }

    /// Cache images for every stored comic that lacks one.
    pub async fn backfill_images(&self) -> Result<BackfillReport> {
        let all_comics = self.repository.find_all().await?;
        let mut report = BackfillReport {
            total: all_comics.len(),
            ..BackfillReport::default()
        };

        info!("Starting image backfill check for {} comics", all_comics.len());

        let candidates: Vec<_> = all_comics
            .into_iter()
            .filter(|comic| {
                let excluded = self.excluded.contains(comic.comic_number);
                if excluded {
                    report.excluded += 1;
                }
                !excluded
            })
            .collect();

        let cache = Arc::clone(&self.cache);
        let checked: Vec<_> = futures::stream::iter(candidates)
            .map(|comic| {
                let cache = Arc::clone(&cache);
                async move {
                    let exists = cache.image_exists_for_comic(comic.comic_number).await;
                    (comic, exists)
                }
            })
            .buffered(self.batch_size)
            .collect()
            .await;

        let mut jobs = Vec::new();
        for (comic, exists) in checked {
            if exists {
                report.already_cached += 1;
                continue;
            }
            if comic.img.trim().is_empty() {
                warn!("Comic {} has no valid image URL", comic.comic_number);
                report.failed += 1;
                continue;
            }
            info!("Comic {} needs backfill; image does not exist in storage", comic.comic_number);
            jobs.push(ImageJob {
                comic_number: comic.comic_number,
                img: comic.img,
            });
        }

        info!(
            "Found {} comics needing image backfill (out of {} total, {} excluded)",
            jobs.len(),
            report.total,
            report.excluded
        );

        if jobs.is_empty() {
            info!("No comics need image backfill; all images already exist in storage");
            return Ok(report);
        }

        let outcome = self.cache_images(jobs, "Backfill").await;
        report.cached = outcome.cached;
        report.failed += outcome.failed;

        info!("Image backfill completed: {} cached, {} failed", report.cached, report.failed);
        Ok(report)
    }

    /// One scheduled job: a sync cycle followed by a backfill pass.
    ///
    /// Errors are logged here and never reach the scheduler.
    pub async fn run_job(&self) {
        match self.run_cycle().await {
            Ok(report) => debug!("Cycle report: {:?}", report),
            Err(SyncError::CycleInProgress) => {
                warn!("Skipping scheduled run; previous cycle still in progress");
                return;
            }
            Err(e) => error!("Sync cycle failed: {}", e),
        }

        if let Err(e) = self.backfill_images().await {
            error!("Backfill images from store failed: {:#}", e);
        }
    }

    async fn cache_images(&self, jobs: Vec<ImageJob>, label: &'static str) -> ImageOutcome {
        let semaphore = Arc::new(Semaphore::new(self.batch_size));

        let tasks: Vec<_> = jobs
            .iter()
            .cloned()
            .map(|job| {
                let images = Arc::clone(&self.images);
                let cache = Arc::clone(&self.cache);
                let semaphore = Arc::clone(&semaphore);
                tokio::spawn(async move {
                    let _permit = semaphore
                        .acquire()
                        .await
                        .map_err(|_| anyhow!("Semaphore acquisition failed"))?;
                    cache_single_image(images.as_ref(), &cache, &job).await
                })
            })
            .collect();

        let results = join_all(tasks).await;

        let mut outcome = ImageOutcome::default();
        for (job, result) in jobs.iter().zip(results) {
            match result {
                Ok(Ok(key)) => {
                    debug!("{}: cached image for comic {} as '{}'", label, job.comic_number, key);
                    outcome.cached += 1;
                }
                Ok(Err(e)) => {
                    if e.downcast_ref::<CacheError>().is_some_and(CacheError::is_fatal) {
                        error!("{}: image cache unusable for comic {}: {:#}", label, job.comic_number, e);
                    } else {
                        warn!("{}: failed to cache image for comic {} ({}): {:#}", label, job.comic_number, job.img, e);
                    }
                    outcome.failed += 1;
                }
                Err(e) => {
                    warn!("{}: image task for comic {} failed to join: {}", label, job.comic_number, e);
                    outcome.failed += 1;
                }
            }
        }

        outcome
    }
}

async fn cache_single_image(images: &dyn ImageSource, cache: &ImageCache, job: &ImageJob) -> Result<String> {
    let file_name =
        extract_image_file_name(&job.img).ok_or_else(|| anyhow!("No image file name in '{}'", job.img))?;

    let key = image_key(job.comic_number);
    debug!("Caching image for comic {} with key '{}'", job.comic_number, key);

    let data = images.fetch(&file_name).await?;
    if !cache.detector().is_image(&data) {
        return Err(anyhow!("Payload for '{}' is not an image ({} bytes)", file_name, data.len()));
    }

    Ok(cache.save_default(&key, data).await?)
}
