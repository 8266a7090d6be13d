// Database connection and pool management
// SQLite through sqlx; the crawler only ensures its own tables exist.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use tracing::info;

use crate::infrastructure::config::DatabaseConfig;

/// Review columns added after the first schema, with their types
const LATER_REVIEW_COLUMNS: [(&str, &str); 5] = [
    ("views_count", "INTEGER"),
    ("exterior_rating", "INTEGER"),
    ("interior_rating", "INTEGER"),
    ("engine_rating", "INTEGER"),
    ("driving_rating", "INTEGER"),
];

pub struct DatabaseConnection {
    pool: SqlitePool,
}

fn database_file_path(database_url: &str) -> &str {
    let path = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);
    path.split('?').next().unwrap_or(path)
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::with_max_connections(database_url, 10).await
    }

    pub async fn from_config(config: &DatabaseConfig) -> Result<Self> {
        Self::with_max_connections(&config.url, config.max_connections).await
    }

    async fn with_max_connections(database_url: &str, max_connections: u32) -> Result<Self> {
        let db_path = database_file_path(database_url);
        if db_path != ":memory:" {
            if let Some(parent) = Path::new(db_path).parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database url {database_url}"))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {database_url}"))?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        let create_brands_sql = r#"
            CREATE TABLE IF NOT EXISTS brands (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slug TEXT NOT NULL UNIQUE,
                display_name TEXT NOT NULL,
                canonical_url TEXT NOT NULL,
                logo_url TEXT,
                site_review_count INTEGER NOT NULL DEFAULT 0,
                review_count INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
        "#;

        let create_models_sql = r#"
            CREATE TABLE IF NOT EXISTS models (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                brand_id INTEGER NOT NULL,
                slug TEXT NOT NULL,
                display_name TEXT NOT NULL,
                canonical_url TEXT NOT NULL,
                site_long_reviews INTEGER,
                site_short_reviews INTEGER,
                long_review_count INTEGER NOT NULL DEFAULT 0,
                short_review_count INTEGER NOT NULL DEFAULT 0,
                last_crawled_at DATETIME,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (brand_id, slug),
                FOREIGN KEY (brand_id) REFERENCES brands (id) ON DELETE CASCADE
            )
        "#;

        let create_reviews_sql = r#"
            CREATE TABLE IF NOT EXISTS reviews (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                model_id INTEGER NOT NULL,
                variant TEXT NOT NULL,
                external_id TEXT,
                content_hash TEXT NOT NULL,
                identity_key TEXT NOT NULL,
                author TEXT,
                city TEXT,
                posted_at DATE,
                vehicle_year INTEGER,
                mileage_km INTEGER,
                engine_volume REAL,
                fuel_type TEXT,
                transmission TEXT,
                drive_type TEXT,
                rating REAL,
                title TEXT,
                pros TEXT,
                cons TEXT,
                defects TEXT,
                body_text TEXT NOT NULL,
                photo_count INTEGER NOT NULL DEFAULT 0,
                source_url TEXT NOT NULL,
                is_complete BOOLEAN NOT NULL DEFAULT 0,
                views_count INTEGER,
                exterior_rating INTEGER,
                interior_rating INTEGER,
                engine_rating INTEGER,
                driving_rating INTEGER,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (model_id, identity_key),
                FOREIGN KEY (model_id) REFERENCES models (id) ON DELETE CASCADE
            )
        "#;

        let create_comments_sql = r#"
            CREATE TABLE IF NOT EXISTS review_comments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                review_id INTEGER NOT NULL,
                position INTEGER NOT NULL,
                author TEXT,
                body TEXT NOT NULL,
                posted_at DATE,
                likes INTEGER NOT NULL DEFAULT 0,
                dislikes INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (review_id, position),
                FOREIGN KEY (review_id) REFERENCES reviews (id) ON DELETE CASCADE
            )
        "#;

        let create_sessions_sql = r#"
            CREATE TABLE IF NOT EXISTS crawl_sessions (
                session_id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                scope TEXT NOT NULL,
                started_at DATETIME NOT NULL,
                ended_at DATETIME,
                status TEXT NOT NULL DEFAULT 'running',
                pages_processed INTEGER NOT NULL DEFAULT 0,
                records_found INTEGER NOT NULL DEFAULT 0,
                records_saved INTEGER NOT NULL DEFAULT 0,
                errors INTEGER NOT NULL DEFAULT 0,
                error_message TEXT
            )
        "#;

        let create_indexes = [
            "CREATE INDEX IF NOT EXISTS idx_models_brand_id ON models (brand_id)",
            "CREATE INDEX IF NOT EXISTS idx_reviews_model_variant ON reviews (model_id, variant)",
            "CREATE INDEX IF NOT EXISTS idx_reviews_content_hash ON reviews (model_id, content_hash)",
            "CREATE INDEX IF NOT EXISTS idx_reviews_external_id ON reviews (model_id, external_id)",
            "CREATE INDEX IF NOT EXISTS idx_sessions_ended_at ON crawl_sessions (ended_at)",
        ];

        for sql in [
            create_brands_sql,
            create_models_sql,
            create_reviews_sql,
            create_comments_sql,
            create_sessions_sql,
        ] {
            sqlx::query(sql).execute(&self.pool).await.context("Failed to create table")?;
        }
        for (column, sql_type) in LATER_REVIEW_COLUMNS {
            self.ensure_column("reviews", column, sql_type).await?;
        }
        for sql in create_indexes {
            sqlx::query(sql).execute(&self.pool).await.context("Failed to create index")?;
        }

        Ok(())
    }

    /// Add a column to a table created by an older schema
    async fn ensure_column(&self, table: &str, column: &str, sql_type: &str) -> Result<()> {
        let existing: Vec<String> = sqlx::query_scalar(&format!("SELECT name FROM pragma_table_info('{table}')"))
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to read columns of {table}"))?;
        if existing.iter().any(|name| name == column) {
            return Ok(());
        }

        sqlx::query(&format!("ALTER TABLE {table} ADD COLUMN {column} {sql_type}"))
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to add {table}.{column}"))?;
        info!("🔧 Added column {}.{}", table, column);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_database_connection() -> Result<()> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("nested").join("test.db");
        let database_url = format!("sqlite:{}", db_path.to_string_lossy());

        let db = DatabaseConnection::new(&database_url).await?;

        assert!(!db.pool().is_closed());
        assert!(db_path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_database_migration_is_repeatable() -> Result<()> {
        let temp_dir = tempdir()?;
        let database_url = format!("sqlite:{}", temp_dir.path().join("test_migration.db").display());

        let db = DatabaseConnection::new(&database_url).await?;
        db.migrate().await?;
        db.migrate().await?;

        for table in ["brands", "models", "reviews", "review_comments", "crawl_sessions"] {
            let result = sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name=?")
                .bind(table)
                .fetch_optional(db.pool())
                .await?;
            assert!(result.is_some(), "missing table {table}");
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_migration_adds_columns_missing_from_an_older_reviews_table() -> Result<()> {
        let temp_dir = tempdir()?;
        let database_url = format!("sqlite:{}", temp_dir.path().join("old_schema.db").display());
        let db = DatabaseConnection::new(&database_url).await?;

        sqlx::query(
            r#"
            CREATE TABLE reviews (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                model_id INTEGER NOT NULL,
                variant TEXT NOT NULL,
                external_id TEXT,
                content_hash TEXT NOT NULL,
                identity_key TEXT NOT NULL,
                body_text TEXT NOT NULL
            )
            "#,
        )
        .execute(db.pool())
        .await?;
        db.migrate().await?;

        let columns: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info('reviews')")
            .fetch_all(db.pool())
            .await?;
        for (column, _) in LATER_REVIEW_COLUMNS {
            assert!(columns.iter().any(|name| name == column), "missing column {column}");
        }
        Ok(())
    }

    #[test]
    fn test_database_file_path() {
        assert_eq!(database_file_path("sqlite:/tmp/a.db"), "/tmp/a.db");
        assert_eq!(database_file_path("sqlite:///tmp/a.db?mode=rwc"), "/tmp/a.db");
    }
}
