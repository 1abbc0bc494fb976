//! Upstream xkcd JSON record (`info.0.json`)

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::comic::NewComic;

/// Comic record as served by the remote archive.
///
/// Date components arrive as separate strings; everything except `num`
/// defaults to empty so a sparse record still decodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct XkcdRecord {
    pub month: String,
    pub num: Option<i32>,
    pub link: String,
    pub year: String,
    pub news: String,
    pub safe_title: String,
    pub transcript: String,
    pub alt: String,
    pub img: String,
    pub title: String,
    pub day: String,
}

impl XkcdRecord {
    /// Parse year/month/day into a calendar date; `None` if any part is
    /// missing, non-numeric, or out of range.
    pub fn publication_date(&self) -> Option<NaiveDate> {
        let year = self.year.trim().parse::<i32>().ok()?;
        let month = self.month.trim().parse::<u32>().ok()?;
        let day = self.day.trim().parse::<u32>().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    }

    pub fn has_image(&self) -> bool {
        !self.img.trim().is_empty()
    }

    pub fn to_new_comic(&self) -> NewComic {
        let publication_date = self.publication_date();
        if publication_date.is_none() {
            warn!(
                "Comic {:?} has unparseable date components (year='{}', month='{}', day='{}'); storing without date",
                self.num, self.year, self.month, self.day
            );
        }

        NewComic {
            comic_number: self.num,
            title: self.title.clone(),
            img: self.img.clone(),
            alt: self.alt.clone(),
            publication_date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WOODPECKER: &str = r#"{"month": "7", "num": 614, "link": "", "year": "2009", "news": "", "safe_title": "Woodpecker", "transcript": "[[A man with a beret and a woman are standing on a boardwalk, leaning on a handrail.]]", "alt": "If you don't have an extension cord I can get that too.  Because we're friends!  Right?", "img": "https://imgs.xkcd.com/comics/woodpecker.png", "title": "Woodpecker", "day": "24"}"#;

    #[test]
    fn deserializes_upstream_json() {
        let record: XkcdRecord = serde_json::from_str(WOODPECKER).unwrap();

        assert_eq!(record.num, Some(614));
        assert_eq!(record.month, "7");
        assert_eq!(record.year, "2009");
        assert_eq!(record.day, "24");
        assert_eq!(record.safe_title, "Woodpecker");
        assert_eq!(record.img, "https://imgs.xkcd.com/comics/woodpecker.png");
        assert!(record.transcript.starts_with("[[A man with a beret"));
        assert_eq!(record.publication_date(), NaiveDate::from_ymd_opt(2009, 7, 24));
    }

    #[test]
    fn serializes_with_upstream_field_names() {
        let record: XkcdRecord = serde_json::from_str(WOODPECKER).unwrap();
        let json = serde_json::to_string(&record).unwrap();

        assert!(json.contains("\"num\":614"));
        assert!(json.contains("\"safe_title\":\"Woodpecker\""));
        assert!(json.contains("\"day\":\"24\""));
    }

    #[test]
    fn distinct_dates_parse_independently() {
        let first = XkcdRecord { year: "2025".into(), month: "8".into(), day: "1".into(), ..Default::default() };
        let second = XkcdRecord { year: "2025".into(), month: "7".into(), day: "31".into(), ..Default::default() };

        assert_eq!(first.publication_date(), NaiveDate::from_ymd_opt(2025, 8, 1));
        assert_eq!(second.publication_date(), NaiveDate::from_ymd_opt(2025, 7, 31));
        assert_ne!(first.publication_date(), second.publication_date());
    }

    #[test]
    fn invalid_date_components_yield_none_but_record_maps() {
        let record = XkcdRecord {
            num: Some(9),
            year: "2009".into(),
            month: "13".into(),
            day: "x".into(),
            title: "Bad Date".into(),
            ..Default::default()
        };

        assert_eq!(record.publication_date(), None);
        let comic = record.to_new_comic();
        assert_eq!(comic.comic_number, Some(9));
        assert_eq!(comic.title, "Bad Date");
        assert_eq!(comic.publication_date, None);
    }

    #[test]
    fn missing_num_decodes_as_none() {
        let record: XkcdRecord = serde_json::from_str(r#"{"title": "orphan"}"#).unwrap();
        assert_eq!(record.num, None);
        assert!(!record.has_image());
    }
}
