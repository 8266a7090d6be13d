//! # Review workers
//!
//! A worker takes one model listing off the queue and paginates it on its
//! own: fetch, extract, resolve and write each page in order, so records
//! of one page are never raced by another worker.

use std::sync::Arc;

use scraper::Html;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::crawling::error::CrawlError;
use crate::crawling::session_tracker::SessionTracker;
use crate::crawling::state::SharedState;
use crate::crawling::work_queue::{WorkItem, WorkReceiver};
use crate::domain::{Review, ReviewAction, ReviewVariant};
use crate::infrastructure::config::CrawlConfig;
use crate::infrastructure::{ExtractContext, PageResult};

/// Per-run pagination limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlLimits {
    pub max_pages: u32,
    pub max_reviews_per_model: u64,
}

impl CrawlLimits {
    pub const fn from_config(config: &CrawlConfig, variant: ReviewVariant) -> Self {
        Self {
            max_pages: match variant {
                ReviewVariant::Long => config.max_long_pages,
                ReviewVariant::Short => config.max_short_pages,
            },
            max_reviews_per_model: config.max_reviews_per_model,
        }
    }
}

/// Counts for one processed work item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemReport {
    pub pages: u32,
    pub found: u64,
    pub saved: u64,
}

pub struct ReviewWorker {
    id: usize,
    state: Arc<SharedState>,
    tracker: Arc<SessionTracker>,
    limits: CrawlLimits,
    cancel: CancellationToken,
}

impl ReviewWorker {
    pub const fn new(
        id: usize,
        state: Arc<SharedState>,
        tracker: Arc<SessionTracker>,
        limits: CrawlLimits,
        cancel: CancellationToken,
    ) -> Self {
        Self { id, state, tracker, limits, cancel }
    }

    /// Process items until the queue closes or the run is cancelled.
    /// A session-fatal error stops this worker and is returned.
    pub async fn run(self, receiver: WorkReceiver) -> Result<u64, CrawlError> {
        let mut processed = 0;
        while let Some(item) = receiver.next(&self.cancel).await {
            match self.process_item(&item).await {
                Ok(report) => {
                    processed += 1;
                    debug!(
                        "Worker {} finished {} {}: {} pages, {} found, {} saved",
                        self.id,
                        item.variant,
                        item.model_key(),
                        report.pages,
                        report.found,
                        report.saved
                    );
                }
                Err(CrawlError::Cancelled) => break,
                Err(e) if e.is_session_fatal() => {
                    error!("❌ Worker {} stopping on {} {}: {}", self.id, item.variant, item.model_key(), e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("⚠️ Worker {} gave up on {} {}: {}", self.id, item.variant, item.model_key(), e);
                    self.tracker.record_error(&e);
                }
            }
        }
        Ok(processed)
    }

    /// Fetch a page through the shared rate-limit pauses.
    /// `None` ends pagination for this item.
    async fn fetch_page(&self, item: &WorkItem, url: &str) -> Result<Option<String>, CrawlError> {
        let e = match self.state.fetch_through_pauses(url).await {
            PageResult::Ok { body, .. } => return Ok(Some(body)),
            PageResult::NotFound => {
                debug!("{} not found, ending {} {}", url, item.variant, item.model_key());
                return Ok(None);
            }
            PageResult::TransientError(_) if self.cancel.is_cancelled() || self.state.is_shutdown_requested() => {
                return Err(CrawlError::Cancelled);
            }
            PageResult::RateLimited(_) => {
                CrawlError::rate_limit_exhausted(url, self.state.config.crawl.max_rate_limit_rounds)
            }
            PageResult::TransientError(cause) => CrawlError::NetworkTransient { url: url.to_string(), cause },
            PageResult::FatalError(cause) => CrawlError::NetworkFatal { url: url.to_string(), cause },
        };
        warn!("⚠️ {} {} (stage: fetch): {}", item.variant, item.model_key(), e);
        self.tracker.record_error(&e);
        Ok(None)
    }

    /// Advertised tab counts from the first long-form page, which is
    /// also the model page
    async fn refresh_tab_counts(&self, item: &WorkItem, body: &str) -> Result<(), CrawlError> {
        let counts = {
            let html = Html::parse_document(body);
            self.state.catalog_parser.parse_tab_counts(&html)
        };
        if counts.long.is_none() && counts.short.is_none() {
            return Ok(());
        }

        let repository = &self.state.repository;
        let stored = repository
            .find_model(&item.brand_slug, &item.model_slug)
            .await
            .map_err(|e| CrawlError::from_storage(&e))?;
        if let Some(mut model) = stored {
            model.site_long_reviews = counts.long.or(model.site_long_reviews);
            model.site_short_reviews = counts.short.or(model.site_short_reviews);
            repository
                .upsert_model(&model)
                .await
                .map_err(|e| CrawlError::from_storage(&e))?;
        }
        Ok(())
    }

    /// Read reader comments from the review's own page. Reviews already
    /// carrying comments and complete stored rows are left alone.
    async fn attach_comments(&self, item: &WorkItem, review: &mut Review) -> Result<(), CrawlError> {
        if !review.comments.is_empty() {
            return Ok(());
        }
        let Some(external_id) = review.external_id.as_deref() else {
            return Ok(());
        };
        let complete = self
            .state
            .repository
            .is_stored_complete(&item.brand_slug, &item.model_slug, external_id)
            .await
            .map_err(|e| CrawlError::from_storage(&e))?;
        if complete {
            return Ok(());
        }

        let url = review.source_url.clone();
        let Some(body) = self.fetch_page(item, &url).await? else {
            return Ok(());
        };
        self.tracker.record_page();
        review.comments = self.state.extractor.extract_comments(&body);
        debug!("💬 {} comments on {}", review.comments.len(), url);
        Ok(())
    }

    /// Paginate one model listing from `item.page`
    pub async fn process_item(&self, item: &WorkItem) -> Result<ItemReport, CrawlError> {
        let base_url = self.state.base_url();
        let mut report = ItemReport::default();

        for page in item.page.max(1)..=self.limits.max_pages {
            if self.cancel.is_cancelled() {
                return Err(CrawlError::Cancelled);
            }

            let url = item.page_url(base_url, page);
            let Some(body) = self.fetch_page(item, &url).await? else {
                break;
            };
            self.tracker.record_page();
            report.pages += 1;

            let context = ExtractContext::new(base_url, &item.brand_slug, &item.model_slug)
                .with_page(page)
                .with_metadata("url", url.clone());
            let extraction = match self.state.extractor.extract(&body, item.variant, &context) {
                Ok(extraction) => extraction,
                Err(e) => {
                    let e = CrawlError::Configuration(e.to_string());
                    error!("❌ {} (stage: extract): {}", context.label(), e);
                    return Err(e);
                }
            };
            if extraction.is_exhausted() {
                debug!("{} has no review blocks, pagination done", context.label());
                break;
            }

            if item.variant == ReviewVariant::Long && page == 1 {
                self.refresh_tab_counts(item, &body).await?;
            }

            let remaining = self.limits.max_reviews_per_model.saturating_sub(report.found);
            let mut reviews: Vec<_> = extraction
                .reviews
                .into_iter()
                .take(usize::try_from(remaining).unwrap_or(usize::MAX))
                .collect();
            self.tracker.record_found(reviews.len() as u64);
            report.found += reviews.len() as u64;

            for review in &mut reviews {
                if self.state.config.crawl.fetch_comments && item.variant == ReviewVariant::Long {
                    self.attach_comments(item, review).await?;
                }
                match self.state.repository.save_review(review, &self.state.deduplicator).await {
                    Ok(ReviewAction::Skip) => debug!("Skipped known review {}", review.identity().key()),
                    Ok(_) => {
                        self.tracker.record_saved(1);
                        report.saved += 1;
                    }
                    Err(e) => match CrawlError::from_storage(&e) {
                        CrawlError::PersistenceConflict { identity } => {
                            info!("🔀 {} (stage: persist): conflict resolved for {}", context.label(), identity);
                        }
                        fatal => return Err(fatal),
                    },
                }
            }

            if report.found >= self.limits.max_reviews_per_model {
                info!("📦 {} reached {} reviews", item.model_key(), self.limits.max_reviews_per_model);
                break;
            }
        }

        Ok(report)
    }
}
