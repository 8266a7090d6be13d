//! Reader comments under a long-form review

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One reader comment, stored under its review row in page order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewComment {
    pub author: Option<String>,
    pub body: String,
    pub posted_at: Option<NaiveDate>,
    pub likes: u32,
    pub dislikes: u32,
}

impl ReviewComment {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            author: None,
            body: body.into(),
            posted_at: None,
            likes: 0,
            dislikes: 0,
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub const fn with_votes(mut self, likes: u32, dislikes: u32) -> Self {
        self.likes = likes;
        self.dislikes = dislikes;
        self
    }

    /// Likes minus dislikes
    pub fn score(&self) -> i64 {
        i64::from(self.likes) - i64::from(self.dislikes)
    }
}
