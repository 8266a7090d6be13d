//! Aggregate snapshot returned by `get_statistics`

use serde::{Deserialize, Serialize};

use super::session::CrawlSession;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrawlStatistics {
    pub total_brands: u64,
    pub total_models: u64,
    pub total_reviews: u64,
    pub long_reviews: u64,
    pub short_reviews: u64,
    pub complete_reviews: u64,
    #[serde(default)]
    pub total_comments: u64,
    /// `(brand slug, stored reviews)` ordered by count, highest first
    pub top_brands: Vec<(String, u64)>,
    pub recent_sessions: Vec<SessionSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub kind: String,
    pub scope: String,
    pub status: String,
    pub pages_processed: u64,
    pub records_found: u64,
    pub records_saved: u64,
    pub errors: u64,
    pub error_message: Option<String>,
}

impl From<&CrawlSession> for SessionSummary {
    fn from(session: &CrawlSession) -> Self {
        Self {
            session_id: session.session_id.clone(),
            kind: session.kind.to_string(),
            scope: session.scope.clone(),
            status: session.status.to_string(),
            pages_processed: session.pages_processed,
            records_found: session.records_found,
            records_saved: session.records_saved,
            errors: session.errors,
            error_message: session.error_message.clone(),
        }
    }
}
