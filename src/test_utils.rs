//! Test utilities for xkcd-sync
//!
//! In-memory stand-ins for the remote archive, the image host and the object
//! store, plus an isolated SQLite database with the schema applied.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::domain::{ClientError, ComicSource, ImageSource, ObjectStore, ObjectStoreError, XkcdRecord};
use crate::infrastructure::{DatabaseConnection, SqliteComicRepository};

/// Smallest valid PNG: signature, IHDR for a 1x1 RGBA image
pub const PNG_BYTES: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52, 0x00, 0x00,
    0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4, 0x89,
];

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Isolated in-memory database with the schema applied
pub struct TestDatabase {
    pub connection: DatabaseConnection,
}

impl TestDatabase {
    pub async fn new() -> Result<Self> {
        let connection = DatabaseConnection::new_in_memory().await?;
        connection.migrate().await?;
        Ok(Self { connection })
    }

    pub fn pool(&self) -> sqlx::SqlitePool {
        self.connection.pool().clone()
    }

    pub fn repository(&self) -> Arc<SqliteComicRepository> {
        Arc::new(SqliteComicRepository::new(self.pool()))
    }
}

/// A plausible upstream record for `num`
pub fn sample_record(num: i32) -> XkcdRecord {
    XkcdRecord {
        num: Some(num),
        year: "2020".into(),
        month: ((num - 1).rem_euclid(12) + 1).to_string(),
        day: ((num - 1).rem_euclid(28) + 1).to_string(),
        title: format!("Comic {num}"),
        safe_title: format!("Comic {num}"),
        alt: format!("Alt text for {num}"),
        img: format!("https://imgs.xkcd.com/comics/comic_{num}.png"),
        ..Default::default()
    }
}

/// Scripted remote archive
#[derive(Default)]
pub struct FakeComicSource {
    records: Mutex<BTreeMap<i32, XkcdRecord>>,
    failing: Mutex<BTreeSet<i32>>,
    fetched: Mutex<Vec<i32>>,
    latest_missing: AtomicBool,
}

impl FakeComicSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Archive serving `sample_record` for every id in `ids`
    pub fn with_comics(ids: impl IntoIterator<Item = i32>) -> Self {
        let source = Self::new();
        for id in ids {
            source.put(sample_record(id));
        }
        source
    }

    pub fn put(&self, record: XkcdRecord) {
        if let Some(num) = record.num {
            lock(&self.records).insert(num, record);
        }
    }

    pub fn fail_on(&self, comic_id: i32) {
        lock(&self.failing).insert(comic_id);
    }

    /// Make `get_latest` fail as if the archive were unreachable
    pub fn set_latest_missing(&self, missing: bool) {
        self.latest_missing.store(missing, Ordering::SeqCst);
    }

    /// Every id requested through `get_by_id`, in call order
    pub fn fetched_ids(&self) -> Vec<i32> {
        lock(&self.fetched).clone()
    }
}

#[async_trait]
impl ComicSource for FakeComicSource {
    async fn get_latest(&self) -> Result<XkcdRecord, ClientError> {
        if self.latest_missing.load(Ordering::SeqCst) {
            return Err(ClientError::Http {
                status: 503,
                url: "fake://info.0.json".into(),
            });
        }

        lock(&self.records)
            .values()
            .next_back()
            .cloned()
            .ok_or_else(|| ClientError::Http {
                status: 404,
                url: "fake://info.0.json".into(),
            })
    }

    async fn get_by_id(&self, comic_id: i32) -> Result<XkcdRecord, ClientError> {
        lock(&self.fetched).push(comic_id);
        let url = format!("fake://{comic_id}/info.0.json");

        if lock(&self.failing).contains(&comic_id) {
            return Err(ClientError::Request {
                url,
                message: "connection reset".into(),
            });
        }

        lock(&self.records)
            .get(&comic_id)
            .cloned()
            .ok_or(ClientError::Http { status: 404, url })
    }
}

/// Image host returning the same payload for every file name
pub struct FakeImageSource {
    payload: Bytes,
    failing: Mutex<BTreeSet<String>>,
    requests: AtomicUsize,
}

impl Default for FakeImageSource {
    fn default() -> Self {
        Self::with_payload(Bytes::from_static(PNG_BYTES))
    }
}

impl FakeImageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_payload(payload: Bytes) -> Self {
        Self {
            payload,
            failing: Mutex::new(BTreeSet::new()),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn fail_on(&self, file_name: &str) {
        lock(&self.failing).insert(file_name.to_string());
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageSource for FakeImageSource {
    async fn fetch(&self, file_name: &str) -> Result<Bytes, ClientError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if lock(&self.failing).contains(file_name) {
            return Err(ClientError::Http {
                status: 404,
                url: format!("fake://comics/{file_name}"),
            });
        }
        Ok(self.payload.clone())
    }
}

/// Bucket-scoped map with counters for the calls the cache makes
pub struct InMemoryObjectStore {
    bucket: String,
    endpoint: Option<String>,
    objects: Mutex<HashMap<String, (Bytes, String)>>,
    bucket_present: AtomicBool,
    heads_fail: AtomicBool,
    presign_fails: AtomicBool,
    bucket_check_delay: Option<Duration>,
    pub bucket_checks: AtomicUsize,
    pub puts: AtomicUsize,
}

impl InMemoryObjectStore {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            endpoint: None,
            objects: Mutex::new(HashMap::new()),
            bucket_present: AtomicBool::new(true),
            heads_fail: AtomicBool::new(false),
            presign_fails: AtomicBool::new(false),
            bucket_check_delay: None,
            bucket_checks: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
        }
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = Some(endpoint.to_string());
        self
    }

    /// Slow the bucket check down so concurrent first use overlaps
    pub fn with_bucket_check_delay(mut self, delay: Duration) -> Self {
        self.bucket_check_delay = Some(delay);
        self
    }

    pub fn set_bucket_present(&self, present: bool) {
        self.bucket_present.store(present, Ordering::SeqCst);
    }

    pub fn fail_heads(&self, fail: bool) {
        self.heads_fail.store(fail, Ordering::SeqCst);
    }

    pub fn fail_presign(&self, fail: bool) {
        self.presign_fails.store(fail, Ordering::SeqCst);
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        lock(&self.objects).get(key).map(|(body, _)| body.clone())
    }

    pub fn content_type_of(&self, key: &str) -> Option<String> {
        lock(&self.objects).get(key).map(|(_, content_type)| content_type.clone())
    }

    /// Stored keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = lock(&self.objects).keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    async fn bucket_exists(&self) -> Result<bool, ObjectStoreError> {
        self.bucket_checks.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.bucket_check_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.bucket_present.load(Ordering::SeqCst))
    }

    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), ObjectStoreError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        lock(&self.objects).insert(key.to_string(), (body, content_type.to_string()));
        Ok(())
    }

    async fn head_object(&self, key: &str) -> Result<u64, ObjectStoreError> {
        if self.heads_fail.load(Ordering::SeqCst) {
            return Err(ObjectStoreError::Backend("simulated HEAD failure".into()));
        }
        lock(&self.objects)
            .get(key)
            .map(|(body, _)| body.len() as u64)
            .ok_or_else(|| ObjectStoreError::NotFound(key.to_string()))
    }

    async fn delete_object(&self, key: &str) -> Result<(), ObjectStoreError> {
        lock(&self.objects).remove(key);
        Ok(())
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String, ObjectStoreError> {
        if self.presign_fails.load(Ordering::SeqCst) {
            return Err(ObjectStoreError::Backend("simulated presign failure".into()));
        }
        Ok(format!(
            "{}/{}/{}?X-Amz-Expires={}",
            self.endpoint.as_deref().unwrap_or("memory:/").trim_end_matches('/'),
            self.bucket,
            key,
            expires_in.as_secs()
        ))
    }
}
