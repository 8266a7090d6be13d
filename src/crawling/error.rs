//! Crawl failure taxonomy
//!
//! Per-item failures are contained: they are logged with their URL and
//! stage and the crawl moves on. Storage unavailability is the only
//! failure that ends a session early.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CrawlError {
    /// Retries were cut short before the URL could be classified
    #[error("Transient network failure for {url}: {cause}")]
    NetworkTransient { url: String, cause: String },

    #[error("Network failure for {url}: {cause}")]
    NetworkFatal { url: String, cause: String },

    #[error("Rate limited on {url}, paused for {pause:?}")]
    RateLimited { url: String, pause: Duration },

    #[error("Field '{field}' missing in {context}")]
    ExtractionPartial { context: String, field: String },

    #[error("No usable content in {context}")]
    ExtractionEmpty { context: String },

    /// A concurrent write raced on the same identity; the stored row wins
    #[error("Write conflict resolved for {identity}")]
    PersistenceConflict { identity: String },

    #[error("Storage unavailable: {0}")]
    PersistenceFatal(String),

    #[error("Crawl cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CrawlError {
    /// Map a gateway failure. Unique-key races become conflicts, anything
    /// else means storage can no longer be trusted.
    pub fn from_storage(error: &anyhow::Error) -> Self {
        let unique_violation = error.chain().any(|cause| {
            matches!(
                cause.downcast_ref::<sqlx::Error>(),
                Some(sqlx::Error::Database(db)) if db.is_unique_violation()
            )
        });

        if unique_violation {
            Self::PersistenceConflict { identity: format!("{error:#}") }
        } else {
            Self::PersistenceFatal(format!("{error:#}"))
        }
    }

    /// A page still answering 429 after every allowed shared pause
    pub fn rate_limit_exhausted(url: &str, rounds: u32) -> Self {
        Self::NetworkFatal {
            url: url.to_string(),
            cause: format!("still rate limited after {rounds} pauses"),
        }
    }

    /// Failures after which no further work in the session can be trusted
    pub const fn is_session_fatal(&self) -> bool {
        matches!(self, Self::PersistenceFatal(_) | Self::Configuration(_))
    }

    /// Whether the session error counter should move
    pub const fn counts_as_error(&self) -> bool {
        matches!(
            self,
            Self::NetworkTransient { .. } | Self::NetworkFatal { .. } | Self::PersistenceFatal(_) | Self::Configuration(_)
        )
    }
}
