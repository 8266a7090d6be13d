//! Deduplication rules for extracted reviews
//!
//! The deduplicator is a pure function over a read-only lookup. It never
//! touches storage itself; the persistence gateway builds a snapshot of
//! the matching stored rows and applies whatever action comes back.

use serde::{Deserialize, Serialize};

use super::review::{FieldMask, Review};

/// Outcome of resolving one candidate against stored state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewAction {
    Insert,
    /// Overwrite the stored row with this id
    Replace(i64),
    Skip,
}

impl ReviewAction {
    /// Whether applying this action writes a row
    pub const fn is_write(self) -> bool {
        !matches!(self, Self::Skip)
    }
}

/// What the deduplicator needs to know about a stored review
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredReview {
    pub id: i64,
    pub external_id: Option<String>,
    pub body_len: usize,
    pub populated: FieldMask,
}

impl StoredReview {
    pub fn from_review(id: i64, review: &Review) -> Self {
        Self {
            id,
            external_id: review.external_id.clone(),
            body_len: review.body_len(),
            populated: review.populated_fields(),
        }
    }
}

/// Read-only view over stored reviews of one model
pub trait ReviewLookup {
    fn by_external_id(&self, model_key: &str, external_id: &str) -> Option<StoredReview>;

    fn by_content_hash(&self, model_key: &str, content_hash: &str) -> Vec<StoredReview>;
}

/// Decides insert/replace/skip for extracted reviews
#[derive(Debug, Clone, Copy)]
pub struct Deduplicator {
    completeness_threshold: usize,
}

impl Deduplicator {
    pub const fn new(completeness_threshold: usize) -> Self {
        Self { completeness_threshold }
    }

    pub const fn completeness_threshold(&self) -> usize {
        self.completeness_threshold
    }

    /// Resolve a candidate against the lookup.
    ///
    /// The site id is consulted first. The content hash is only a fallback
    /// and never matches a stored row that carries a different site id.
    pub fn resolve(&self, candidate: &Review, lookup: &dyn ReviewLookup) -> ReviewAction {
        let model_key = candidate.model_key();

        let existing = candidate
            .external_id
            .as_deref()
            .and_then(|id| lookup.by_external_id(&model_key, id))
            .or_else(|| {
                lookup
                    .by_content_hash(&model_key, &candidate.content_hash)
                    .into_iter()
                    .find(|stored| match (&stored.external_id, &candidate.external_id) {
                        (Some(stored_id), Some(candidate_id)) => stored_id == candidate_id,
                        _ => true,
                    })
            });

        match existing {
            None => ReviewAction::Insert,
            Some(stored) => self.resolve_against(candidate, &stored),
        }
    }

    fn resolve_against(&self, candidate: &Review, stored: &StoredReview) -> ReviewAction {
        if stored.body_len >= self.completeness_threshold {
            return ReviewAction::Skip;
        }

        let candidate_len = candidate.body_len();
        let longer = candidate_len > stored.body_len;
        let fills_gaps = candidate_len >= stored.body_len
            && candidate.populated_fields().newly_populated_over(stored.populated);

        if longer || fills_gaps {
            ReviewAction::Replace(stored.id)
        } else {
            ReviewAction::Skip
        }
    }
}
