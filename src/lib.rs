//! drom reviews crawler - polite, resumable crawler for drom.ru owner reviews
//!
//! Walks the brand → model catalog, extracts long-form and short ("5
//! kopeek") reviews, deduplicates them against stored data and keeps
//! per-run session accounting in sqlite.

// Module declarations
pub mod crawling;
pub mod domain;
pub mod infrastructure;

pub use crawling::{CatalogOutcome, CrawlError, CrawlLimits, CrawlOrchestrator};
pub use domain::{CrawlScope, CrawlSession, CrawlStatistics, Review, ReviewVariant};
pub use infrastructure::{AppConfig, ConfigManager};
