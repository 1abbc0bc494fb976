//! Comic entities and the identifier rules shared by the sync pipeline
//!
//! A comic's identity is its comic number. The surrogate `id` is assigned by
//! the store and never leaves the persistence layer's control.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Lowest comic number the remote archive serves
pub const FIRST_COMIC_ID: i32 = 1;

/// Object cache key prefix for comic images
pub const IMAGE_KEY_PREFIX: &str = "xkcd/";

/// Marker that precedes the image file name in upstream image URLs
pub const COMICS_PATH_MARKER: &str = "/comics/";

/// A persisted comic row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comic {
    pub id: i64,
    #[serde(rename = "comicNumber")]
    pub comic_number: i32,
    pub title: String,
    pub img: String,
    pub alt: String,
    #[serde(rename = "publicationDate")]
    pub publication_date: Option<NaiveDate>,
}

/// A comic about to be merged into the store.
///
/// Carries no surrogate id: the store either matches it to an existing row by
/// comic number or inserts it fresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewComic {
    pub comic_number: Option<i32>,
    pub title: String,
    pub img: String,
    pub alt: String,
    pub publication_date: Option<NaiveDate>,
}

impl Comic {
    /// Overwrite the mutable fields from an incoming record, keeping identity.
    pub fn merge_from(&mut self, incoming: &NewComic) {
        self.title.clone_from(&incoming.title);
        self.img.clone_from(&incoming.img);
        self.alt.clone_from(&incoming.alt);
        self.publication_date = incoming.publication_date;
    }
}

/// Inclusive range of comic numbers to fetch in one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRange {
    pub start_id: i32,
    pub latest_id: i32,
}

impl FetchRange {
    pub fn new(start_id: i32, latest_id: i32) -> Self {
        Self { start_id, latest_id }
    }

    /// Start of the next range given the highest stored comic number
    pub fn start_after(highest_stored: Option<i32>) -> i32 {
        highest_stored
            .map_or(FIRST_COMIC_ID, |highest| highest.saturating_add(1))
            .max(FIRST_COMIC_ID)
    }

    pub fn is_empty(&self) -> bool {
        self.start_id > self.latest_id
    }

    /// Split the range into ascending batches of at most `batch_size` ids,
    /// dropping excluded ids before batching.
    pub fn batches(&self, batch_size: usize, excluded: &ExcludedComics) -> Vec<Vec<i32>> {
        if self.is_empty() || batch_size == 0 {
            return Vec::new();
        }

        let ids: Vec<i32> = (self.start_id..=self.latest_id)
            .filter(|id| {
                if excluded.contains(*id) {
                    tracing::info!("Skipping excluded comic {}", id);
                    false
                } else {
                    true
                }
            })
            .collect();

        ids.chunks(batch_size).map(<[i32]>::to_vec).collect()
    }
}

/// Comic numbers known to have no usable image; never fetched or cached
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExcludedComics(BTreeSet<i32>);

impl ExcludedComics {
    pub fn new(ids: impl IntoIterator<Item = i32>) -> Self {
        Self(ids.into_iter().collect())
    }

    pub fn contains(&self, comic_number: i32) -> bool {
        self.0.contains(&comic_number)
    }
}

/// Object cache key for a comic's image
pub fn image_key(comic_number: i32) -> String {
    format!("{IMAGE_KEY_PREFIX}{comic_number}")
}

/// Derive the image file name from an upstream image URL.
///
/// Takes what follows the first `/comics/` marker (leading slashes stripped),
/// otherwise the last path segment.
pub fn extract_image_file_name(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }

    if let Some(idx) = url.find(COMICS_PATH_MARKER) {
        let rest = url[idx + COMICS_PATH_MARKER.len()..].trim_start_matches('/');
        return (!rest.is_empty()).then(|| rest.to_string());
    }

    match url.rfind('/') {
        Some(idx) if idx + 1 < url.len() => Some(url[idx + 1..].to_string()),
        _ => None,
    }
}
