// Database connection and pool management
// This module handles SQLite database connections using sqlx

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let db_path = database_url
            .strip_prefix("sqlite://")
            .or_else(|| database_url.strip_prefix("sqlite:"))
            .unwrap_or(database_url);

        if let Some(parent) = Path::new(db_path).parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL: {database_url}"))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to {database_url}"))?;

        info!("Connected to database: {}", database_url);
        Ok(Self { pool })
    }

    /// Single-connection in-memory database.
    ///
    /// Every SQLite `:memory:` connection is a separate database, so the pool
    /// is pinned to one connection that is never recycled.
    pub async fn new_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory database")?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        let create_comics_sql = r#"
            CREATE TABLE IF NOT EXISTS comics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                comic_number INTEGER NOT NULL UNIQUE,
                title TEXT NOT NULL DEFAULT '',
                img TEXT NOT NULL DEFAULT '',
                alt TEXT NOT NULL DEFAULT '',
                publication_date TEXT,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
        "#;

        let create_indexes_sql = [
            "CREATE INDEX IF NOT EXISTS idx_comics_publication_date ON comics (publication_date)",
            "CREATE INDEX IF NOT EXISTS idx_comics_title ON comics (title)",
        ];

        sqlx::query(create_comics_sql).execute(&self.pool).await?;
        for sql in create_indexes_sql {
            sqlx::query(sql).execute(&self.pool).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_database_connection() -> Result<()> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("nested").join("test.db");
        let database_url = format!("sqlite:{}", db_path.to_string_lossy());

        let db = DatabaseConnection::new(&database_url, 2).await?;

        assert!(!db.pool().is_closed());
        assert!(db_path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_database_migration() -> Result<()> {
        let db = DatabaseConnection::new_in_memory().await?;

        db.migrate().await?;
        // Re-running is harmless
        db.migrate().await?;

        let result = sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name='comics'")
            .fetch_optional(db.pool())
            .await?;
        assert!(result.is_some());

        let index = sqlx::query("SELECT name FROM sqlite_master WHERE type='index' AND name='idx_comics_publication_date'")
            .fetch_one(db.pool())
            .await?;
        let name: String = index.get("name");
        assert_eq!(name, "idx_comics_publication_date");
        Ok(())
    }

    #[tokio::test]
    async fn test_comic_number_is_unique() -> Result<()> {
        let db = DatabaseConnection::new_in_memory().await?;
        db.migrate().await?;

        sqlx::query("INSERT INTO comics (comic_number, title) VALUES (1, 'a')")
            .execute(db.pool())
            .await?;
        let duplicate = sqlx::query("INSERT INTO comics (comic_number, title) VALUES (1, 'b')")
            .execute(db.pool())
            .await;

        assert!(duplicate.is_err());
        Ok(())
    }
}
