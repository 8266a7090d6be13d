//! Domain module - core entities and pure decision logic
//!
//! Nothing in here performs I/O. Catalog entries, reviews, crawl sessions
//! and the deduplication rules are plain values that the infrastructure
//! and crawling layers move around.

pub mod catalog;
pub mod comment;
pub mod dedup;
pub mod review;
pub mod session;
pub mod statistics;

// Re-export commonly used items
pub use catalog::{Brand, Model};
pub use comment::ReviewComment;
pub use dedup::{Deduplicator, ReviewAction, ReviewLookup, StoredReview};
pub use review::{OwnerRatings, RatingCategory, Review, ReviewVariant, content_hash, normalize_text};
pub use session::{CrawlScope, CrawlSession, SessionKind, SessionStatus};
pub use statistics::{CrawlStatistics, SessionSummary};
