//! Persistence gateway: the only writer of catalog, review and session rows
//!
//! Review writes are serialized per model (`brand/model`), so the dedup
//! read-then-write is atomic across both the site-id and the content-hash
//! lookup. The row write and the derived counter refresh share one
//! transaction whose first statement is a write, which keeps SQLite from
//! failing the upgrade from a read snapshot to a write lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::{debug, info, warn};

use crate::domain::{
    Brand, CrawlSession, CrawlStatistics, Deduplicator, Model, OwnerRatings, Review, ReviewAction, ReviewComment,
    ReviewLookup, ReviewVariant, SessionStatus, SessionSummary, StoredReview,
};
use crate::infrastructure::config::defaults;

const REVIEW_COLUMNS: &str = "id, variant, external_id, content_hash, author, city, posted_at, vehicle_year, \
    mileage_km, engine_volume, fuel_type, transmission, drive_type, rating, title, pros, cons, defects, \
    body_text, photo_count, source_url, views_count, exterior_rating, interior_rating, engine_rating, \
    driving_rating";

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn to_u32(value: i64) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

fn score_from(value: Option<i64>) -> Option<u8> {
    value.and_then(|score| u8::try_from(score).ok())
}

/// Row ids of a stored model and its brand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ModelIds {
    model_id: i64,
    brand_id: i64,
}

/// Stored rows matching one candidate, read under its model lock
#[derive(Debug, Default)]
struct ReviewSnapshot {
    by_external: Option<StoredReview>,
    by_hash: Vec<StoredReview>,
}

impl ReviewLookup for ReviewSnapshot {
    fn by_external_id(&self, _model_key: &str, external_id: &str) -> Option<StoredReview> {
        self.by_external
            .clone()
            .filter(|stored| stored.external_id.as_deref() == Some(external_id))
    }

    fn by_content_hash(&self, _model_key: &str, _content_hash: &str) -> Vec<StoredReview> {
        self.by_hash.clone()
    }
}

/// Repository over the sqlite pool
#[derive(Clone)]
pub struct ReviewRepository {
    pool: Arc<SqlitePool>,
    completeness_threshold: usize,
    model_locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl ReviewRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool: Arc::new(pool),
            completeness_threshold: defaults::COMPLETENESS_THRESHOLD,
            model_locks: Arc::default(),
        }
    }

    pub const fn with_completeness_threshold(mut self, threshold: usize) -> Self {
        self.completeness_threshold = threshold;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ===============================
    // CATALOG
    // ===============================

    /// Insert or refresh a brand by slug. Derived counts are left alone.
    pub async fn upsert_brand(&self, brand: &Brand) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO brands (slug, display_name, canonical_url, logo_url, site_review_count)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (slug) DO UPDATE SET
                display_name = excluded.display_name,
                canonical_url = excluded.canonical_url,
                logo_url = COALESCE(excluded.logo_url, brands.logo_url),
                site_review_count = excluded.site_review_count,
                updated_at = CURRENT_TIMESTAMP
            RETURNING id
            "#,
        )
        .bind(&brand.slug)
        .bind(&brand.display_name)
        .bind(&brand.canonical_url)
        .bind(&brand.logo_url)
        .bind(to_i64(brand.site_review_count))
        .fetch_one(&*self.pool)
        .await
        .with_context(|| format!("Failed to upsert brand {}", brand.slug))?;
        Ok(id)
    }

    /// Insert or refresh a model by (brand, slug). The brand must exist.
    pub async fn upsert_model(&self, model: &Model) -> Result<i64> {
        let brand_id: i64 = sqlx::query_scalar("SELECT id FROM brands WHERE slug = ?")
            .bind(&model.brand_slug)
            .fetch_optional(&*self.pool)
            .await?
            .ok_or_else(|| anyhow!("Brand {} not stored, cannot upsert model {}", model.brand_slug, model.slug))?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO models (brand_id, slug, display_name, canonical_url, site_long_reviews, site_short_reviews)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (brand_id, slug) DO UPDATE SET
                display_name = excluded.display_name,
                canonical_url = excluded.canonical_url,
                site_long_reviews = COALESCE(excluded.site_long_reviews, models.site_long_reviews),
                site_short_reviews = COALESCE(excluded.site_short_reviews, models.site_short_reviews),
                updated_at = CURRENT_TIMESTAMP
            RETURNING id
            "#,
        )
        .bind(brand_id)
        .bind(&model.slug)
        .bind(&model.display_name)
        .bind(&model.canonical_url)
        .bind(model.site_long_reviews.map(to_i64))
        .bind(model.site_short_reviews.map(to_i64))
        .fetch_one(&*self.pool)
        .await
        .with_context(|| format!("Failed to upsert model {}", model.key()))?;
        Ok(id)
    }

    fn brand_from_row(row: &SqliteRow) -> Result<Brand> {
        let mut brand = Brand::new(
            row.try_get::<String, _>("slug")?,
            row.try_get::<String, _>("display_name")?,
            row.try_get::<String, _>("canonical_url")?,
        )
        .with_site_review_count(to_u64(row.try_get("site_review_count")?));
        brand.logo_url = row.try_get("logo_url")?;
        brand.review_count = to_u64(row.try_get("review_count")?);
        Ok(brand)
    }

    pub async fn find_brand(&self, slug: &str) -> Result<Option<Brand>> {
        let row = sqlx::query(
            "SELECT slug, display_name, canonical_url, logo_url, site_review_count, review_count FROM brands WHERE slug = ?",
        )
        .bind(slug)
        .fetch_optional(&*self.pool)
        .await?;
        row.as_ref().map(Self::brand_from_row).transpose()
    }

    /// All brands, most advertised reviews first
    pub async fn list_brands(&self) -> Result<Vec<Brand>> {
        let rows = sqlx::query(
            r#"
            SELECT slug, display_name, canonical_url, logo_url, site_review_count, review_count
            FROM brands
            ORDER BY site_review_count DESC, slug ASC
            "#,
        )
        .fetch_all(&*self.pool)
        .await?;
        rows.iter().map(Self::brand_from_row).collect()
    }

    /// Models of one brand in slug order
    pub async fn list_models(&self, brand_slug: &str) -> Result<Vec<Model>> {
        let rows = sqlx::query(
            r#"
            SELECT m.slug, m.display_name, m.canonical_url, m.site_long_reviews, m.site_short_reviews,
                   m.long_review_count, m.short_review_count
            FROM models m
            JOIN brands b ON b.id = m.brand_id
            WHERE b.slug = ?
            ORDER BY m.slug ASC
            "#,
        )
        .bind(brand_slug)
        .fetch_all(&*self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let mut model = Model::new(
                    brand_slug,
                    row.try_get::<String, _>("slug")?,
                    row.try_get::<String, _>("display_name")?,
                    row.try_get::<String, _>("canonical_url")?,
                );
                model.site_long_reviews = row.try_get::<Option<i64>, _>("site_long_reviews")?.map(to_u64);
                model.site_short_reviews = row.try_get::<Option<i64>, _>("site_short_reviews")?.map(to_u64);
                model.long_review_count = to_u64(row.try_get("long_review_count")?);
                model.short_review_count = to_u64(row.try_get("short_review_count")?);
                Ok(model)
            })
            .collect()
    }

    pub async fn find_model(&self, brand_slug: &str, model_slug: &str) -> Result<Option<Model>> {
        Ok(self
            .list_models(brand_slug)
            .await?
            .into_iter()
            .find(|model| model.slug == model_slug))
    }

    async fn model_ids(&self, brand_slug: &str, model_slug: &str) -> Result<ModelIds> {
        let row = sqlx::query(
            r#"
            SELECT m.id AS model_id, b.id AS brand_id
            FROM models m
            JOIN brands b ON b.id = m.brand_id
            WHERE b.slug = ? AND m.slug = ?
            "#,
        )
        .bind(brand_slug)
        .bind(model_slug)
        .fetch_optional(&*self.pool)
        .await?
        .ok_or_else(|| anyhow!("Model {brand_slug}/{model_slug} not stored, refusing review write"))?;

        Ok(ModelIds {
            model_id: row.try_get("model_id")?,
            brand_id: row.try_get("brand_id")?,
        })
    }

    // ===============================
    // REVIEWS
    // ===============================

    fn review_from_row(row: &SqliteRow, brand_slug: &str, model_slug: &str) -> Result<Review> {
        let variant: ReviewVariant = row.try_get("variant")?;
        let mut review = Review::new(brand_slug, model_slug, variant, row.try_get("source_url")?);
        review.external_id = row.try_get("external_id")?;
        review.content_hash = row.try_get("content_hash")?;
        review.author = row.try_get("author")?;
        review.city = row.try_get("city")?;
        review.posted_at = row.try_get::<Option<NaiveDate>, _>("posted_at")?;
        review.vehicle_year = row.try_get("vehicle_year")?;
        review.mileage_km = row
            .try_get::<Option<i64>, _>("mileage_km")?
            .and_then(|km| u32::try_from(km).ok());
        review.engine_volume = row.try_get("engine_volume")?;
        review.fuel_type = row.try_get("fuel_type")?;
        review.transmission = row.try_get("transmission")?;
        review.drive_type = row.try_get("drive_type")?;
        review.rating = row.try_get("rating")?;
        review.title = row.try_get("title")?;
        review.pros = row.try_get("pros")?;
        review.cons = row.try_get("cons")?;
        review.defects = row.try_get("defects")?;
        review.body_text = row.try_get("body_text")?;
        review.photo_count = to_u32(row.try_get("photo_count")?);
        review.views_count = row.try_get::<Option<i64>, _>("views_count")?.map(to_u32);
        review.owner_ratings = OwnerRatings {
            exterior: score_from(row.try_get("exterior_rating")?),
            interior: score_from(row.try_get("interior_rating")?),
            engine: score_from(row.try_get("engine_rating")?),
            driving: score_from(row.try_get("driving_rating")?),
        };
        Ok(review)
    }

    /// Stored reviews of one model with their comments, oldest first
    pub async fn list_reviews(&self, brand_slug: &str, model_slug: &str) -> Result<Vec<Review>> {
        let ids = self.model_ids(brand_slug, model_slug).await?;
        let rows = sqlx::query(&format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE model_id = ? ORDER BY id"))
            .bind(ids.model_id)
            .fetch_all(&*self.pool)
            .await?;
        let mut comments = self.comments_by_review(ids.model_id).await?;

        rows.iter()
            .map(|row| {
                let mut review = Self::review_from_row(row, brand_slug, model_slug)?;
                let id: i64 = row.try_get("id")?;
                review.comments = comments.remove(&id).unwrap_or_default();
                Ok(review)
            })
            .collect()
    }

    /// Comments of every review of one model, grouped by review row
    async fn comments_by_review(&self, model_id: i64) -> Result<HashMap<i64, Vec<ReviewComment>>> {
        let rows = sqlx::query(
            r#"
            SELECT c.review_id, c.author, c.body, c.posted_at, c.likes, c.dislikes
            FROM review_comments c
            JOIN reviews r ON r.id = c.review_id
            WHERE r.model_id = ?
            ORDER BY c.review_id, c.position
            "#,
        )
        .bind(model_id)
        .fetch_all(&*self.pool)
        .await
        .context("Failed to load review comments")?;

        let mut grouped: HashMap<i64, Vec<ReviewComment>> = HashMap::new();
        for row in &rows {
            let comment = ReviewComment {
                author: row.try_get("author")?,
                body: row.try_get("body")?,
                posted_at: row.try_get::<Option<NaiveDate>, _>("posted_at")?,
                likes: to_u32(row.try_get("likes")?),
                dislikes: to_u32(row.try_get("dislikes")?),
            };
            grouped.entry(row.try_get("review_id")?).or_default().push(comment);
        }
        Ok(grouped)
    }

    /// Whether a review with this site id is stored and already complete
    pub async fn is_stored_complete(&self, brand_slug: &str, model_slug: &str, external_id: &str) -> Result<bool> {
        let ids = self.model_ids(brand_slug, model_slug).await?;
        let complete: Option<bool> =
            sqlx::query_scalar("SELECT is_complete FROM reviews WHERE model_id = ? AND external_id = ?")
                .bind(ids.model_id)
                .bind(external_id)
                .fetch_optional(&*self.pool)
                .await?;
        Ok(complete.unwrap_or(false))
    }

    async fn load_snapshot(&self, model_id: i64, candidate: &Review) -> Result<ReviewSnapshot> {
        let stored = |row: &SqliteRow| -> Result<StoredReview> {
            let id: i64 = row.try_get("id")?;
            let review = Self::review_from_row(row, &candidate.brand_slug, &candidate.model_slug)?;
            Ok(StoredReview::from_review(id, &review))
        };

        let by_external = match &candidate.external_id {
            Some(external_id) => sqlx::query(&format!(
                "SELECT {REVIEW_COLUMNS} FROM reviews WHERE model_id = ? AND external_id = ?"
            ))
            .bind(model_id)
            .bind(external_id)
            .fetch_optional(&*self.pool)
            .await?
            .as_ref()
            .map(stored)
            .transpose()?,
            None => None,
        };

        let by_hash = sqlx::query(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE model_id = ? AND content_hash = ? ORDER BY id"
        ))
        .bind(model_id)
        .bind(&candidate.content_hash)
        .fetch_all(&*self.pool)
        .await?
        .iter()
        .map(stored)
        .collect::<Result<Vec<_>>>()?;

        Ok(ReviewSnapshot { by_external, by_hash })
    }

    fn model_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.model_locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.entry(key.to_string()).or_default().clone()
    }

    fn release_model_lock(&self, key: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = match self.model_locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // The map and this caller hold the only references
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
    }

    /// Resolve a candidate against stored state and apply the outcome,
    /// atomically per model
    pub async fn save_review(&self, candidate: &Review, deduplicator: &Deduplicator) -> Result<ReviewAction> {
        let ids = self.model_ids(&candidate.brand_slug, &candidate.model_slug).await?;
        let lock_key = candidate.model_key();
        let lock = self.model_lock(&lock_key);

        let result = {
            let _guard = lock.lock().await;
            let outcome = async {
                let snapshot = self.load_snapshot(ids.model_id, candidate).await?;
                let action = deduplicator.resolve(candidate, &snapshot);
                self.apply_with_ids(action, candidate, ids).await?;
                Ok::<_, anyhow::Error>(action)
            };
            outcome.await
        };

        self.release_model_lock(&lock_key, lock);
        result
    }

    /// Apply an already-resolved action for a review
    pub async fn apply_review_action(&self, action: ReviewAction, record: &Review) -> Result<()> {
        if !action.is_write() {
            return Ok(());
        }
        let ids = self.model_ids(&record.brand_slug, &record.model_slug).await?;
        self.apply_with_ids(action, record, ids).await
    }

    async fn apply_with_ids(&self, action: ReviewAction, record: &Review, ids: ModelIds) -> Result<()> {
        let mut tx = match action {
            ReviewAction::Skip => return Ok(()),
            ReviewAction::Insert => {
                let mut tx = self.pool.begin().await.context("Failed to begin review transaction")?;
                self.insert_review(&mut tx, record, ids.model_id).await?;
                tx
            }
            ReviewAction::Replace(review_id) => {
                let mut tx = self.pool.begin().await.context("Failed to begin review transaction")?;
                self.replace_review(&mut tx, record, ids.model_id, review_id).await?;
                tx
            }
        };

        Self::refresh_counters(&mut tx, ids).await?;
        tx.commit().await.context("Failed to commit review transaction")?;
        debug!("💾 {:?} review {} for {}", action, record.identity().key(), record.model_key());
        Ok(())
    }

    async fn insert_review(&self, tx: &mut Transaction<'_, Sqlite>, record: &Review, model_id: i64) -> Result<()> {
        let review_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO reviews
            (model_id, variant, external_id, content_hash, identity_key, author, city, posted_at,
             vehicle_year, mileage_km, engine_volume, fuel_type, transmission, drive_type, rating,
             title, pros, cons, defects, body_text, photo_count, source_url, is_complete,
             views_count, exterior_rating, interior_rating, engine_rating, driving_rating)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(model_id)
        .bind(record.variant)
        .bind(&record.external_id)
        .bind(&record.content_hash)
        .bind(record.identity().key())
        .bind(&record.author)
        .bind(&record.city)
        .bind(record.posted_at)
        .bind(record.vehicle_year)
        .bind(record.mileage_km.map(i64::from))
        .bind(record.engine_volume)
        .bind(&record.fuel_type)
        .bind(&record.transmission)
        .bind(&record.drive_type)
        .bind(record.rating)
        .bind(&record.title)
        .bind(&record.pros)
        .bind(&record.cons)
        .bind(&record.defects)
        .bind(&record.body_text)
        .bind(i64::from(record.photo_count))
        .bind(&record.source_url)
        .bind(record.is_complete(self.completeness_threshold))
        .bind(record.views_count.map(i64::from))
        .bind(record.owner_ratings.exterior.map(i64::from))
        .bind(record.owner_ratings.interior.map(i64::from))
        .bind(record.owner_ratings.engine.map(i64::from))
        .bind(record.owner_ratings.driving.map(i64::from))
        .fetch_one(&mut **tx)
        .await
        .with_context(|| format!("Failed to insert review {}", record.source_url))?;

        Self::write_comments(tx, review_id, &record.comments).await
    }

    /// Store comments in page order under one review row
    async fn write_comments(tx: &mut Transaction<'_, Sqlite>, review_id: i64, comments: &[ReviewComment]) -> Result<()> {
        for (position, comment) in comments.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO review_comments (review_id, position, author, body, posted_at, likes, dislikes)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(review_id)
            .bind(to_i64(position as u64))
            .bind(&comment.author)
            .bind(&comment.body)
            .bind(comment.posted_at)
            .bind(i64::from(comment.likes))
            .bind(i64::from(comment.dislikes))
            .execute(&mut **tx)
            .await
            .with_context(|| format!("Failed to store comment {position} of review {review_id}"))?;
        }
        Ok(())
    }

    /// Overwrite a stored row in place. A site id already on the row is
    /// kept when the candidate has none; stored comments are kept when the
    /// candidate carries none.
    async fn replace_review(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        record: &Review,
        model_id: i64,
        review_id: i64,
    ) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE reviews SET
                identity_key = CASE WHEN ? IS NULL AND external_id IS NOT NULL THEN identity_key ELSE ? END,
                external_id = COALESCE(?, external_id),
                content_hash = ?, author = ?, city = ?, posted_at = ?, vehicle_year = ?, mileage_km = ?,
                engine_volume = ?, fuel_type = ?, transmission = ?, drive_type = ?, rating = ?,
                title = ?, pros = ?, cons = ?, defects = ?, body_text = ?, photo_count = ?,
                source_url = ?, is_complete = ?, views_count = ?, exterior_rating = ?,
                interior_rating = ?, engine_rating = ?, driving_rating = ?, updated_at = CURRENT_TIMESTAMP
            WHERE id = ? AND model_id = ?
            "#,
        )
        .bind(&record.external_id)
        .bind(record.identity().key())
        .bind(&record.external_id)
        .bind(&record.content_hash)
        .bind(&record.author)
        .bind(&record.city)
        .bind(record.posted_at)
        .bind(record.vehicle_year)
        .bind(record.mileage_km.map(i64::from))
        .bind(record.engine_volume)
        .bind(&record.fuel_type)
        .bind(&record.transmission)
        .bind(&record.drive_type)
        .bind(record.rating)
        .bind(&record.title)
        .bind(&record.pros)
        .bind(&record.cons)
        .bind(&record.defects)
        .bind(&record.body_text)
        .bind(i64::from(record.photo_count))
        .bind(&record.source_url)
        .bind(record.is_complete(self.completeness_threshold))
        .bind(record.views_count.map(i64::from))
        .bind(record.owner_ratings.exterior.map(i64::from))
        .bind(record.owner_ratings.interior.map(i64::from))
        .bind(record.owner_ratings.engine.map(i64::from))
        .bind(record.owner_ratings.driving.map(i64::from))
        .bind(review_id)
        .bind(model_id)
        .execute(&mut **tx)
        .await
        .with_context(|| format!("Failed to replace review {review_id}"))?;

        if updated.rows_affected() == 0 {
            return Err(anyhow!("Review {review_id} vanished before replace"));
        }

        if !record.comments.is_empty() {
            sqlx::query("DELETE FROM review_comments WHERE review_id = ?")
                .bind(review_id)
                .execute(&mut **tx)
                .await
                .with_context(|| format!("Failed to clear comments of review {review_id}"))?;
            Self::write_comments(tx, review_id, &record.comments).await?;
        }
        Ok(())
    }

    /// Recompute model and brand counts from the review rows
    async fn refresh_counters(tx: &mut Transaction<'_, Sqlite>, ids: ModelIds) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE models SET
                long_review_count = (SELECT COUNT(*) FROM reviews WHERE model_id = ? AND variant = 'long'),
                short_review_count = (SELECT COUNT(*) FROM reviews WHERE model_id = ? AND variant = 'short'),
                last_crawled_at = CURRENT_TIMESTAMP,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
        )
        .bind(ids.model_id)
        .bind(ids.model_id)
        .bind(ids.model_id)
        .execute(&mut **tx)
        .await
        .context("Failed to refresh model counters")?;

        sqlx::query(
            r#"
            UPDATE brands SET
                review_count = (
                    SELECT COALESCE(SUM(long_review_count + short_review_count), 0)
                    FROM models WHERE brand_id = ?
                ),
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
        )
        .bind(ids.brand_id)
        .bind(ids.brand_id)
        .execute(&mut **tx)
        .await
        .context("Failed to refresh brand counter")?;
        Ok(())
    }

    // ===============================
    // SESSIONS
    // ===============================

    /// Insert or checkpoint a session. Rows already closed are never reopened.
    pub async fn write_session(&self, session: &CrawlSession) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO crawl_sessions
            (session_id, kind, scope, started_at, ended_at, status, pages_processed,
             records_found, records_saved, errors, error_message)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (session_id) DO UPDATE SET
                ended_at = excluded.ended_at,
                status = excluded.status,
                pages_processed = excluded.pages_processed,
                records_found = excluded.records_found,
                records_saved = excluded.records_saved,
                errors = excluded.errors,
                error_message = excluded.error_message
            WHERE crawl_sessions.ended_at IS NULL
            "#,
        )
        .bind(&session.session_id)
        .bind(session.kind)
        .bind(&session.scope)
        .bind(session.started_at)
        .bind(session.ended_at)
        .bind(session.status)
        .bind(to_i64(session.pages_processed))
        .bind(to_i64(session.records_found))
        .bind(to_i64(session.records_saved))
        .bind(to_i64(session.errors))
        .bind(&session.error_message)
        .execute(&*self.pool)
        .await
        .with_context(|| format!("Failed to write session {}", session.session_id))?;
        Ok(())
    }

    /// Mark sessions left `running` by a previous process as failed.
    /// Must run at startup before any new session begins.
    pub async fn reconcile_interrupted_sessions(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE crawl_sessions SET
                status = ?,
                ended_at = ?,
                error_message = COALESCE(error_message, 'interrupted')
            WHERE ended_at IS NULL
            "#,
        )
        .bind(SessionStatus::Failed)
        .bind(Utc::now())
        .execute(&*self.pool)
        .await
        .context("Failed to reconcile interrupted sessions")?;

        let reconciled = result.rows_affected();
        if reconciled > 0 {
            warn!("⚠️ Marked {} interrupted session(s) as failed", reconciled);
        } else {
            info!("✅ No interrupted sessions found");
        }
        Ok(reconciled)
    }

    fn session_from_row(row: &SqliteRow) -> Result<CrawlSession> {
        Ok(CrawlSession {
            session_id: row.try_get("session_id")?,
            kind: row.try_get("kind")?,
            scope: row.try_get("scope")?,
            started_at: row.try_get::<DateTime<Utc>, _>("started_at")?,
            ended_at: row.try_get::<Option<DateTime<Utc>>, _>("ended_at")?,
            status: row.try_get("status")?,
            pages_processed: to_u64(row.try_get("pages_processed")?),
            records_found: to_u64(row.try_get("records_found")?),
            records_saved: to_u64(row.try_get("records_saved")?),
            errors: to_u64(row.try_get("errors")?),
            error_message: row.try_get("error_message")?,
        })
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<CrawlSession>> {
        let row = sqlx::query("SELECT * FROM crawl_sessions WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&*self.pool)
            .await?;
        row.as_ref().map(Self::session_from_row).transpose()
    }

    pub async fn recent_sessions(&self, limit: u32) -> Result<Vec<CrawlSession>> {
        let rows = sqlx::query("SELECT * FROM crawl_sessions ORDER BY started_at DESC LIMIT ?")
            .bind(i64::from(limit))
            .fetch_all(&*self.pool)
            .await?;
        rows.iter().map(Self::session_from_row).collect()
    }

    // ===============================
    // STATISTICS
    // ===============================

    pub async fn statistics(&self) -> Result<CrawlStatistics> {
        let totals = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM brands) AS total_brands,
                (SELECT COUNT(*) FROM models) AS total_models,
                (SELECT COUNT(*) FROM reviews) AS total_reviews,
                (SELECT COUNT(*) FROM reviews WHERE variant = 'long') AS long_reviews,
                (SELECT COUNT(*) FROM reviews WHERE variant = 'short') AS short_reviews,
                (SELECT COUNT(*) FROM reviews WHERE is_complete = 1) AS complete_reviews,
                (SELECT COUNT(*) FROM review_comments) AS total_comments
            "#,
        )
        .fetch_one(&*self.pool)
        .await
        .context("Failed to read totals")?;

        let top_brands = sqlx::query(
            "SELECT slug, review_count FROM brands WHERE review_count > 0 ORDER BY review_count DESC, slug ASC LIMIT 10",
        )
        .fetch_all(&*self.pool)
        .await?
        .iter()
        .map(|row| Ok((row.try_get::<String, _>("slug")?, to_u64(row.try_get("review_count")?))))
        .collect::<Result<Vec<_>>>()?;

        let recent_sessions = self
            .recent_sessions(10)
            .await?
            .iter()
            .map(SessionSummary::from)
            .collect();

        Ok(CrawlStatistics {
            total_brands: to_u64(totals.try_get("total_brands")?),
            total_models: to_u64(totals.try_get("total_models")?),
            total_reviews: to_u64(totals.try_get("total_reviews")?),
            long_reviews: to_u64(totals.try_get("long_reviews")?),
            short_reviews: to_u64(totals.try_get("short_reviews")?),
            complete_reviews: to_u64(totals.try_get("complete_reviews")?),
            total_comments: to_u64(totals.try_get("total_comments")?),
            top_brands,
            recent_sessions,
        })
    }
}
