//! # Crawling pipeline
//!
//! Catalog walker → bounded work queue → review workers, all accounted
//! under one session tracker. The orchestrator exposes the three entry
//! points: catalog discovery, scoped review crawl and statistics.

pub mod catalog_walker;
pub mod error;
pub mod orchestrator;
pub mod session_tracker;
pub mod state;
pub mod work_queue;
pub mod workers;

// Clean re-exports
pub use catalog_walker::{CatalogCache, CatalogDiff, CatalogWalker};
pub use error::CrawlError;
pub use orchestrator::{CatalogOutcome, CrawlOrchestrator};
pub use session_tracker::SessionTracker;
pub use state::SharedState;
pub use work_queue::{WorkItem, WorkReceiver, WorkSender, work_queue};
pub use workers::{CrawlLimits, ItemReport, ReviewWorker};
