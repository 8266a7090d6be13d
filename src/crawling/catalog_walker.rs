//! Catalog discovery and work-item emission
//!
//! Discovery walks the reviews root and every brand page, writes each
//! entry through to the gateway and diffs the result against the last
//! cached snapshot. Emission turns stored (or freshly discovered) models
//! into work items, highest-value brands first.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use scraper::Html;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::crawling::error::CrawlError;
use crate::crawling::session_tracker::SessionTracker;
use crate::crawling::state::SharedState;
use crate::crawling::work_queue::{WorkItem, WorkSender};
use crate::domain::catalog::{order_brands, order_models};
use crate::domain::{Brand, CrawlScope, Model, ReviewVariant};
use crate::infrastructure::PageResult;
use crate::infrastructure::config::drom;
use crate::infrastructure::parsing::ParsingError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedModel {
    pub slug: String,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedBrand {
    pub slug: String,
    pub name: String,
    pub url: String,
    pub review_count: u64,
    pub models: Vec<CachedModel>,
}

/// Last successful catalog snapshot, stored as JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogCache {
    pub generated_at: DateTime<Utc>,
    pub brands: Vec<CachedBrand>,
}

impl CatalogCache {
    /// Missing or unreadable caches count as "no previous snapshot"
    pub async fn load(path: &Path) -> Option<Self> {
        let content = fs::read_to_string(path).await.ok()?;
        match serde_json::from_str(&content) {
            Ok(cache) => Some(cache),
            Err(e) => {
                warn!("⚠️ Ignoring unreadable catalog cache {}: {}", path.display(), e);
                None
            }
        }
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create catalog cache directory")?;
        }
        let content = serde_json::to_string_pretty(self).context("Failed to serialize catalog cache")?;
        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write catalog cache {}", path.display()))
    }

    fn brand(&self, slug: &str) -> Option<&CachedBrand> {
        self.brands.iter().find(|brand| brand.slug == slug)
    }

    fn brand_slugs(&self) -> BTreeSet<String> {
        self.brands.iter().map(|brand| brand.slug.clone()).collect()
    }

    fn model_keys(&self) -> BTreeSet<String> {
        self.brands
            .iter()
            .flat_map(|brand| brand.models.iter().map(move |model| format!("{}/{}", brand.slug, model.slug)))
            .collect()
    }
}

/// Entries added or removed since the previous snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogDiff {
    pub added_brands: Vec<String>,
    pub removed_brands: Vec<String>,
    /// `brand/model` keys
    pub added_models: Vec<String>,
    pub removed_models: Vec<String>,
}

impl CatalogDiff {
    /// With no previous snapshot everything counts as added
    pub fn between(previous: Option<&CatalogCache>, current: &CatalogCache) -> Self {
        let (old_brands, old_models) = previous
            .map(|cache| (cache.brand_slugs(), cache.model_keys()))
            .unwrap_or_default();
        let (new_brands, new_models) = (current.brand_slugs(), current.model_keys());

        Self {
            added_brands: new_brands.difference(&old_brands).cloned().collect(),
            removed_brands: old_brands.difference(&new_brands).cloned().collect(),
            added_models: new_models.difference(&old_models).cloned().collect(),
            removed_models: old_models.difference(&new_models).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added_brands.is_empty()
            && self.removed_brands.is_empty()
            && self.added_models.is_empty()
            && self.removed_models.is_empty()
    }
}

pub struct CatalogWalker {
    state: Arc<SharedState>,
    cache_path: PathBuf,
}

impl CatalogWalker {
    pub fn new(state: Arc<SharedState>) -> Self {
        let cache_path = state.config.crawl.catalog_cache_path.clone();
        Self { state, cache_path }
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    async fn fetch_catalog_page(&self, url: &str, tracker: &SessionTracker) -> Result<String, CrawlError> {
        match self.state.fetch_through_pauses(url).await {
            PageResult::Ok { body, .. } => {
                tracker.record_page();
                Ok(body)
            }
            PageResult::NotFound => Err(CrawlError::NetworkFatal {
                url: url.to_string(),
                cause: "not found".into(),
            }),
            PageResult::RateLimited(_) => Err(CrawlError::rate_limit_exhausted(
                url,
                self.state.config.crawl.max_rate_limit_rounds,
            )),
            PageResult::TransientError(_) if self.state.is_shutdown_requested() => Err(CrawlError::Cancelled),
            PageResult::TransientError(cause) => Err(CrawlError::NetworkTransient { url: url.to_string(), cause }),
            PageResult::FatalError(cause) => Err(CrawlError::NetworkFatal { url: url.to_string(), cause }),
        }
    }

    /// Brands of the reviews root, most reviewed first
    pub async fn discover_brands(&self, tracker: &SessionTracker) -> Result<Vec<Brand>, CrawlError> {
        let url = drom::reviews_root_url(self.state.base_url());
        let body = self.fetch_catalog_page(&url, tracker).await?;

        let parsed = {
            let html = Html::parse_document(&body);
            self.state.catalog_parser.parse_brands(&html, self.state.base_url())
        };
        let mut brands = parsed.map_err(|e| match e {
            ParsingError::CatalogMarkersMissing { url } => CrawlError::ExtractionEmpty { context: url },
            other => CrawlError::Configuration(other.to_string()),
        })?;

        order_brands(&mut brands);
        info!("🔍 Discovered {} brands", brands.len());
        Ok(brands)
    }

    /// Models linked from a brand page, in slug order
    pub async fn discover_models(&self, brand_slug: &str, tracker: &SessionTracker) -> Result<Vec<Model>, CrawlError> {
        let url = drom::brand_url(self.state.base_url(), brand_slug);
        let body = self.fetch_catalog_page(&url, tracker).await?;

        let mut models = {
            let html = Html::parse_document(&body);
            self.state.catalog_parser.parse_models(&html, brand_slug, self.state.base_url())
        };
        order_models(&mut models);
        debug!("🔍 {} models for {}", models.len(), brand_slug);
        Ok(models)
    }

    /// Full discovery run. A brand whose page fails keeps its previously
    /// cached models and is skipped for this run.
    pub async fn run_discovery(&self, tracker: &SessionTracker, cancel: &CancellationToken) -> Result<CatalogDiff, CrawlError> {
        let repository = &self.state.repository;
        let previous = CatalogCache::load(&self.cache_path).await;

        let brands = self.discover_brands(tracker).await?;
        tracker.record_found(brands.len() as u64);

        let mut cache = CatalogCache {
            generated_at: Utc::now(),
            brands: Vec::with_capacity(brands.len()),
        };

        for brand in &brands {
            if cancel.is_cancelled() {
                return Err(CrawlError::Cancelled);
            }
            repository
                .upsert_brand(brand)
                .await
                .map_err(|e| CrawlError::from_storage(&e))?;
            tracker.record_saved(1);

            let models = match self.discover_models(&brand.slug, tracker).await {
                Ok(models) => {
                    tracker.record_found(models.len() as u64);
                    for model in &models {
                        repository
                            .upsert_model(model)
                            .await
                            .map_err(|e| CrawlError::from_storage(&e))?;
                    }
                    tracker.record_saved(models.len() as u64);
                    models
                        .iter()
                        .map(|model| CachedModel {
                            slug: model.slug.clone(),
                            name: model.display_name.clone(),
                            url: model.canonical_url.clone(),
                        })
                        .collect()
                }
                Err(CrawlError::Cancelled) => return Err(CrawlError::Cancelled),
                Err(e) => {
                    warn!("⚠️ Skipping models of {} (stage: catalog): {}", brand.slug, e);
                    tracker.record_error(&e);
                    previous
                        .as_ref()
                        .and_then(|cache| cache.brand(&brand.slug))
                        .map(|cached| cached.models.clone())
                        .unwrap_or_default()
                }
            };

            cache.brands.push(CachedBrand {
                slug: brand.slug.clone(),
                name: brand.display_name.clone(),
                url: brand.canonical_url.clone(),
                review_count: brand.site_review_count,
                models,
            });
        }

        let diff = CatalogDiff::between(previous.as_ref(), &cache);
        if let Err(e) = cache.save(&self.cache_path).await {
            warn!("⚠️ Catalog cache not updated: {:#}", e);
        }
        info!(
            "✅ Catalog: +{} / -{} brands, +{} / -{} models",
            diff.added_brands.len(),
            diff.removed_brands.len(),
            diff.added_models.len(),
            diff.removed_models.len()
        );
        Ok(diff)
    }

    async fn ensure_brand(&self, brand_slug: &str) -> Result<Brand, CrawlError> {
        let repository = &self.state.repository;
        if let Some(brand) = repository
            .find_brand(brand_slug)
            .await
            .map_err(|e| CrawlError::from_storage(&e))?
        {
            return Ok(brand);
        }

        let brand = Brand::new(brand_slug, brand_slug, drom::brand_url(self.state.base_url(), brand_slug));
        repository
            .upsert_brand(&brand)
            .await
            .map_err(|e| CrawlError::from_storage(&e))?;
        Ok(brand)
    }

    /// Stored models of a brand, discovering them when none are stored
    /// yet or the requested one is missing
    async fn models_in_scope(
        &self,
        brand: &Brand,
        scope: &CrawlScope,
        tracker: &SessionTracker,
    ) -> Result<Vec<Model>, CrawlError> {
        let repository = &self.state.repository;
        let stored = repository
            .list_models(&brand.slug)
            .await
            .map_err(|e| CrawlError::from_storage(&e))?;

        let has_requested = scope.model.as_deref().is_none_or(|m| stored.iter().any(|s| s.slug == m));
        let mut models = if !stored.is_empty() && has_requested {
            stored
        } else {
            match self.discover_models(&brand.slug, tracker).await {
                Ok(discovered) => {
                    for model in &discovered {
                        repository
                            .upsert_model(model)
                            .await
                            .map_err(|e| CrawlError::from_storage(&e))?;
                    }
                    discovered
                }
                Err(CrawlError::Cancelled) => return Err(CrawlError::Cancelled),
                Err(e) => {
                    warn!("⚠️ Model list of {} unavailable (stage: catalog): {}", brand.slug, e);
                    tracker.record_error(&e);
                    stored
                }
            }
        };

        models.retain(|model| scope.matches_model(&model.slug));
        if let Some(requested) = scope.model.as_deref() {
            if models.is_empty() {
                warn!("⚠️ {}/{} not listed on the brand page, crawling it directly", brand.slug, requested);
                let model = Model::new(
                    &brand.slug,
                    requested,
                    requested.replace('_', " "),
                    drom::model_url(self.state.base_url(), &brand.slug, requested),
                );
                repository
                    .upsert_model(&model)
                    .await
                    .map_err(|e| CrawlError::from_storage(&e))?;
                models.push(model);
            }
        }

        order_models(&mut models);
        Ok(models)
    }

    /// Feed work items for `scope` until done or cancelled. Returns the
    /// number of items enqueued.
    pub async fn feed(
        &self,
        scope: &CrawlScope,
        variant: ReviewVariant,
        sender: WorkSender,
        tracker: &SessionTracker,
        cancel: &CancellationToken,
    ) -> Result<usize, CrawlError> {
        let mut brands = match &scope.brand {
            Some(slug) => vec![self.ensure_brand(slug).await?],
            None => self
                .state
                .repository
                .list_brands()
                .await
                .map_err(|e| CrawlError::from_storage(&e))?,
        };
        if brands.is_empty() {
            return Err(CrawlError::Configuration(
                "No brands stored; run catalog discovery first".into(),
            ));
        }
        order_brands(&mut brands);

        let mut enqueued = 0;
        for brand in &brands {
            if cancel.is_cancelled() {
                break;
            }
            let models = self.models_in_scope(brand, scope, tracker).await?;
            for model in models {
                let item = WorkItem::new(&brand.slug, &model.slug, variant);
                if !sender.send(item, cancel).await {
                    info!("🛑 Work emission stopped after {} items", enqueued);
                    return Ok(enqueued);
                }
                enqueued += 1;
            }
        }

        info!("📋 Enqueued {} {} work items for {}", enqueued, variant, scope);
        Ok(enqueued)
    }
}
