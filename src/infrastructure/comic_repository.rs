//! SQLite implementation of the comic store
//!
//! Batches are merged by comic number inside a single transaction: existing
//! rows are loaded with one `IN (...)` lookup and keep their surrogate id,
//! unknown comic numbers are inserted. Any failure rolls the whole batch back.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use crate::domain::{Comic, ComicRepository, NewComic};

const COMIC_COLUMNS: &str = "id, comic_number, title, img, alt, publication_date";

pub struct SqliteComicRepository {
    pool: SqlitePool,
}

impl SqliteComicRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_comic(row: &SqliteRow) -> Comic {
        Comic {
            id: row.get("id"),
            comic_number: row.get("comic_number"),
            title: row.get("title"),
            img: row.get("img"),
            alt: row.get("alt"),
            publication_date: row.get("publication_date"),
        }
    }

    /// Collapse a batch to one record per comic number, last occurrence wins.
    fn dedupe_by_comic_number(comics: &[NewComic]) -> BTreeMap<i32, &NewComic> {
        let mut by_number = BTreeMap::new();
        for comic in comics {
            match comic.comic_number {
                Some(number) => {
                    if by_number.insert(number, comic).is_some() {
                        debug!("Comic {} appears more than once in batch; keeping the last", number);
                    }
                }
                None => warn!("Skipping comic without a comic number: '{}'", comic.title),
            }
        }
        by_number
    }

    /// Stored rows for `numbers`, keyed by comic number, in one query
    async fn load_existing(conn: &mut SqliteConnection, numbers: &[i32]) -> Result<HashMap<i32, Comic>> {
        let mut lookup =
            QueryBuilder::<Sqlite>::new(format!("SELECT {COMIC_COLUMNS} FROM comics WHERE comic_number IN ("));
        let mut separated = lookup.separated(", ");
        for &number in numbers {
            separated.push_bind(number);
        }
        separated.push_unseparated(")");

        let rows = lookup.build().fetch_all(conn).await?;
        Ok(rows
            .iter()
            .map(Self::row_to_comic)
            .map(|comic| (comic.comic_number, comic))
            .collect())
    }
}

#[async_trait]
impl ComicRepository for SqliteComicRepository {
    async fn save_comics(&self, comics: &[NewComic]) -> Result<Vec<Comic>> {
        let incoming = Self::dedupe_by_comic_number(comics);
        if incoming.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await?;
        let numbers: Vec<i32> = incoming.keys().copied().collect();
        let mut existing = Self::load_existing(&mut *tx, &numbers).await?;
        debug!("{} of {} comics in batch already stored", existing.len(), numbers.len());

        let mut saved = Vec::with_capacity(incoming.len());

        for (comic_number, comic) in incoming {
            let persisted = match existing.remove(&comic_number) {
                Some(mut stored) => {
                    stored.merge_from(comic);
                    sqlx::query(
                        r#"
                        UPDATE comics
                        SET title = ?, img = ?, alt = ?, publication_date = ?, updated_at = CURRENT_TIMESTAMP
                        WHERE id = ?
                        "#,
                    )
                    .bind(&stored.title)
                    .bind(&stored.img)
                    .bind(&stored.alt)
                    .bind(stored.publication_date)
                    .bind(stored.id)
                    .execute(&mut *tx)
                    .await?;
                    stored
                }
                None => {
                    let row = sqlx::query(
                        r#"
                        INSERT INTO comics (comic_number, title, img, alt, publication_date)
                        VALUES (?, ?, ?, ?, ?)
                        RETURNING id
                        "#,
                    )
                    .bind(comic_number)
                    .bind(&comic.title)
                    .bind(&comic.img)
                    .bind(&comic.alt)
                    .bind(comic.publication_date)
                    .fetch_one(&mut *tx)
                    .await?;

                    Comic {
                        id: row.get("id"),
                        comic_number,
                        title: comic.title.clone(),
                        img: comic.img.clone(),
                        alt: comic.alt.clone(),
                        publication_date: comic.publication_date,
                    }
                }
            };
            saved.push(persisted);
        }

        tx.commit().await?;
        debug!("Persisted {} comics", saved.len());
        Ok(saved)
    }

    async fn highest_comic_number(&self) -> Result<Option<i32>> {
        let row = sqlx::query("SELECT MAX(comic_number) AS highest FROM comics")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<Option<i32>, _>("highest"))
    }

    async fn find_all(&self) -> Result<Vec<Comic>> {
        let rows = sqlx::query(&format!("SELECT {COMIC_COLUMNS} FROM comics ORDER BY comic_number"))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(Self::row_to_comic).collect())
    }

    async fn find_by_comic_number(&self, comic_number: i32) -> Result<Option<Comic>> {
        let row = sqlx::query(&format!("SELECT {COMIC_COLUMNS} FROM comics WHERE comic_number = ?"))
            .bind(comic_number)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(Self::row_to_comic))
    }

    async fn find_by_title(&self, title: &str) -> Result<Vec<Comic>> {
        let rows = sqlx::query(&format!(
            "SELECT {COMIC_COLUMNS} FROM comics WHERE title = ? ORDER BY comic_number"
        ))
        .bind(title)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(Self::row_to_comic).collect())
    }

    async fn find_by_date(&self, date: NaiveDate) -> Result<Vec<Comic>> {
        let rows = sqlx::query(&format!(
            "SELECT {COMIC_COLUMNS} FROM comics WHERE publication_date = ? ORDER BY comic_number"
        ))
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(Self::row_to_comic).collect())
    }

    async fn count(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM comics")
            .fetch_one(&self.pool)
            .await?;
        let total: i64 = row.get("total");
        Ok(total as u64)
    }

    async fn delete_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM comics").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn delete_by_title(&self, title: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM comics WHERE title = ?")
            .bind(title)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_by_comic_number(&self, comic_number: i32) -> Result<bool> {
        let result = sqlx::query("DELETE FROM comics WHERE comic_number = ?")
            .bind(comic_number)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_date(&self, date: NaiveDate) -> Result<u64> {
        let result = sqlx::query("DELETE FROM comics WHERE publication_date = ?")
            .bind(date)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::DatabaseConnection;

    async fn setup_test_repo() -> Result<SqliteComicRepository> {
        let db = DatabaseConnection::new_in_memory().await?;
        db.migrate().await?;
        Ok(SqliteComicRepository::new(db.pool().clone()))
    }

    fn new_comic(number: i32, title: &str, date: Option<NaiveDate>) -> NewComic {
        NewComic {
            comic_number: Some(number),
            title: title.to_string(),
            img: format!("https://imgs.xkcd.com/comics/{}.png", title.to_lowercase()),
            alt: format!("{title} alt"),
            publication_date: date,
        }
    }

    #[tokio::test]
    async fn test_empty_store_has_no_highest() -> Result<()> {
        let repo = setup_test_repo().await?;
        assert_eq!(repo.highest_comic_number().await?, None);
        assert_eq!(repo.count().await?, 0);
        assert!(repo.save_comics(&[]).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_save_and_find() -> Result<()> {
        let repo = setup_test_repo().await?;
        let date = NaiveDate::from_ymd_opt(2009, 7, 24);

        let saved = repo
            .save_comics(&[new_comic(614, "Woodpecker", date), new_comic(1, "Barrel", None)])
            .await?;

        assert_eq!(saved.len(), 2);
        assert_eq!(repo.count().await?, 2);
        assert_eq!(repo.highest_comic_number().await?, Some(614));

        let found = repo.find_by_comic_number(614).await?.expect("stored comic");
        assert_eq!(found.title, "Woodpecker");
        assert_eq!(found.publication_date, date);

        assert_eq!(repo.find_by_title("Barrel").await?.len(), 1);
        assert_eq!(repo.find_by_date(date.unwrap()).await?.len(), 1);
        assert_eq!(repo.find_all().await?.iter().map(|c| c.comic_number).collect::<Vec<_>>(), vec![1, 614]);
        Ok(())
    }

    #[tokio::test]
    async fn test_upsert_keeps_surrogate_id() -> Result<()> {
        let repo = setup_test_repo().await?;

        let first = repo.save_comics(&[new_comic(5, "Before", None)]).await?;
        let original_id = first[0].id;

        let date = NaiveDate::from_ymd_opt(2006, 1, 1);
        let second = repo.save_comics(&[new_comic(5, "After", date)]).await?;

        assert_eq!(second[0].id, original_id);
        assert_eq!(repo.count().await?, 1);

        let stored = repo.find_by_comic_number(5).await?.expect("stored comic");
        assert_eq!(stored.id, original_id);
        assert_eq!(stored.title, "After");
        assert_eq!(stored.publication_date, date);
        Ok(())
    }

    #[tokio::test]
    async fn test_mixed_batch_keeps_existing_ids() -> Result<()> {
        let repo = setup_test_repo().await?;

        fn id_of(comics: &[Comic], number: i32) -> Option<i64> {
            comics.iter().find(|c| c.comic_number == number).map(|c| c.id)
        }

        let first = repo
            .save_comics(&[new_comic(1, "One", None), new_comic(3, "Three", None)])
            .await?;
        let (id_one, id_three) = (id_of(&first, 1), id_of(&first, 3));

        let second = repo
            .save_comics(&[
                new_comic(1, "One Revised", None),
                new_comic(2, "Two", None),
                new_comic(3, "Three Revised", None),
                new_comic(4, "Four", None),
            ])
            .await?;

        assert_eq!(second.len(), 4);
        assert_eq!(id_of(&second, 1), id_one);
        assert_eq!(id_of(&second, 3), id_three);
        assert_eq!(repo.count().await?, 4);

        let stored = repo.find_all().await?;
        assert_eq!(id_of(&stored, 1), id_one);
        assert_eq!(id_of(&stored, 3), id_three);
        assert_eq!(
            stored.iter().map(|c| c.title.as_str()).collect::<Vec<_>>(),
            vec!["One Revised", "Two", "Three Revised", "Four"]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_batch_rolls_back() -> Result<()> {
        let db = DatabaseConnection::new_in_memory().await?;
        db.migrate().await?;
        let repo = SqliteComicRepository::new(db.pool().clone());

        repo.save_comics(&[new_comic(1, "Original", None)]).await?;

        sqlx::query(
            r#"
            CREATE TRIGGER reject_comic_three BEFORE INSERT ON comics
            WHEN NEW.comic_number = 3
            BEGIN
                SELECT RAISE(ABORT, 'comic 3 rejected');
            END
            "#,
        )
        .execute(db.pool())
        .await?;

        let result = repo
            .save_comics(&[
                new_comic(1, "Changed", None),
                new_comic(2, "Two", None),
                new_comic(3, "Three", None),
            ])
            .await;

        assert!(result.is_err());
        assert_eq!(repo.count().await?, 1);
        assert_eq!(repo.find_by_comic_number(1).await?.map(|c| c.title), Some("Original".into()));
        assert!(repo.find_by_comic_number(2).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicates_within_batch_collapse_to_last() -> Result<()> {
        let repo = setup_test_repo().await?;

        let saved = repo
            .save_comics(&[new_comic(3, "First", None), new_comic(3, "Second", None)])
            .await?;

        assert_eq!(saved.len(), 1);
        assert_eq!(repo.count().await?, 1);
        assert_eq!(repo.find_by_comic_number(3).await?.map(|c| c.title), Some("Second".into()));
        Ok(())
    }

    #[tokio::test]
    async fn test_records_without_number_are_skipped() -> Result<()> {
        let repo = setup_test_repo().await?;
        let mut orphan = new_comic(0, "Orphan", None);
        orphan.comic_number = None;

        let saved = repo.save_comics(&[orphan, new_comic(2, "Kept", None)]).await?;

        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].comic_number, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_deletes_report_counts() -> Result<()> {
        let repo = setup_test_repo().await?;
        let date = NaiveDate::from_ymd_opt(2020, 2, 2);
        repo.save_comics(&[
            new_comic(1, "Same", None),
            new_comic(2, "Same", date),
            new_comic(3, "Other", date),
            new_comic(4, "Last", None),
        ])
        .await?;

        assert_eq!(repo.delete_by_title("Same").await?, 2);
        assert_eq!(repo.delete_by_date(date.unwrap()).await?, 1);
        assert!(repo.delete_by_comic_number(4).await?);
        assert!(!repo.delete_by_comic_number(4).await?);
        assert_eq!(repo.delete_all().await?, 0);
        Ok(())
    }
}
