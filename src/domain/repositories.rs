//! Repository interfaces for the comic store
//!
//! The store is keyed by comic number; all writes preserve the invariant of
//! exactly one row per comic number.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::comic::{Comic, NewComic};

#[async_trait]
pub trait ComicRepository: Send + Sync {
    /// Merge a batch into the store inside one transaction.
    ///
    /// Records without a comic number are skipped. Existing rows keep their
    /// surrogate id and receive the incoming title, image, alt text and date.
    async fn save_comics(&self, comics: &[NewComic]) -> Result<Vec<Comic>>;

    /// Highest stored comic number, `None` when the store is empty
    async fn highest_comic_number(&self) -> Result<Option<i32>>;

    async fn find_all(&self) -> Result<Vec<Comic>>;
    async fn find_by_comic_number(&self, comic_number: i32) -> Result<Option<Comic>>;
    async fn find_by_title(&self, title: &str) -> Result<Vec<Comic>>;
    async fn find_by_date(&self, date: NaiveDate) -> Result<Vec<Comic>>;
    async fn count(&self) -> Result<u64>;

    // Maintenance operations, not used by the sync path
    async fn delete_all(&self) -> Result<u64>;
    async fn delete_by_title(&self, title: &str) -> Result<u64>;
    async fn delete_by_comic_number(&self, comic_number: i32) -> Result<bool>;
    async fn delete_by_date(&self, date: NaiveDate) -> Result<u64>;
}
