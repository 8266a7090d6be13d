//! # Shared crawl state
//!
//! The components every worker and the walker need, built once from the
//! configuration and shared behind an `Arc`.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::crawling::CrawlError;
use crate::domain::Deduplicator;
use crate::infrastructure::{
    AppConfig, CatalogParser, HttpTransport, PageFetcher, PageResult, RateLimitGate, ReviewExtractor,
    ReviewRepository,
};

pub struct SharedState {
    pub config: Arc<AppConfig>,
    pub fetcher: PageFetcher,
    pub extractor: ReviewExtractor,
    pub catalog_parser: CatalogParser,
    pub repository: ReviewRepository,
    pub deduplicator: Deduplicator,

    /// External shutdown signal; fetches in flight observe it too
    pub cancellation_token: CancellationToken,
}

impl SharedState {
    pub fn new(
        config: Arc<AppConfig>,
        transport: Arc<dyn HttpTransport>,
        repository: ReviewRepository,
        cancellation_token: CancellationToken,
    ) -> Result<Self, CrawlError> {
        let extractor =
            ReviewExtractor::new(&config.selectors).map_err(|e| CrawlError::Configuration(e.to_string()))?;
        let catalog_parser =
            CatalogParser::with_config(&config.selectors.catalog).map_err(|e| CrawlError::Configuration(e.to_string()))?;
        let fetcher = PageFetcher::new(
            transport,
            &config.fetch,
            Arc::new(RateLimitGate::new()),
            cancellation_token.clone(),
        );
        let threshold = config.crawl.completeness_threshold;

        Ok(Self {
            fetcher,
            extractor,
            catalog_parser,
            repository: repository.with_completeness_threshold(threshold),
            deduplicator: Deduplicator::new(threshold),
            cancellation_token,
            config,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.config.fetch.base_url
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Fetch `url`, requesting it again after each shared rate-limit pause.
    /// `RateLimited` is returned only once `max_rate_limit_rounds` pauses
    /// have been waited out.
    pub async fn fetch_through_pauses(&self, url: &str) -> PageResult {
        let max_rounds = self.config.crawl.max_rate_limit_rounds;
        let mut rounds = 0;
        loop {
            match self.fetcher.fetch(url).await {
                PageResult::RateLimited(pause) if rounds < max_rounds => {
                    rounds += 1;
                    let limited = CrawlError::RateLimited { url: url.to_string(), pause };
                    info!("⏸️ {}, requesting again ({}/{})", limited, rounds, max_rounds);
                }
                result => return result,
            }
        }
    }
}
