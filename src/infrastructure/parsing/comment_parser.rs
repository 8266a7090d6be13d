//! Reader comments under a long-form review
//!
//! Comments show up on the review's own page and sometimes inline in a
//! listing block. Both paths copy raw strings out of the DOM first and
//! normalize them afterwards.

use scraper::{ElementRef, Html};
use tracing::debug;

use super::config::CommentSelectors;
use super::selectors::{SelectorGroup, element_text, non_empty};
use super::text_normalizer as norm;
use super::ParsingResult;
use crate::domain::ReviewComment;

pub struct CommentParser {
    item: SelectorGroup,
    author: SelectorGroup,
    body: SelectorGroup,
    date: SelectorGroup,
    likes: SelectorGroup,
    dislikes: SelectorGroup,
}

/// Raw strings copied out of one comment element
#[derive(Debug, Default)]
pub(crate) struct RawComment {
    author: Option<String>,
    body: Option<String>,
    date: Option<String>,
    likes: Option<String>,
    dislikes: Option<String>,
}

impl RawComment {
    /// `None` for comments without text
    pub(crate) fn normalize(self) -> Option<ReviewComment> {
        let votes = |raw: Option<String>| {
            raw.as_deref()
                .and_then(norm::parse_count)
                .and_then(|count| u32::try_from(count).ok())
                .unwrap_or(0)
        };

        Some(ReviewComment {
            body: self.body?,
            author: self.author,
            posted_at: self.date.as_deref().and_then(norm::parse_date),
            likes: votes(self.likes),
            dislikes: votes(self.dislikes),
        })
    }
}

impl CommentParser {
    pub fn new() -> ParsingResult<Self> {
        Self::with_config(&CommentSelectors::default())
    }

    pub fn with_config(selectors: &CommentSelectors) -> ParsingResult<Self> {
        Ok(Self {
            item: SelectorGroup::compile("comment.item", &selectors.item)?,
            author: SelectorGroup::compile("comment.author", &selectors.author)?,
            body: SelectorGroup::compile("comment.body", &selectors.body)?,
            date: SelectorGroup::compile("comment.date", &selectors.date)?,
            likes: SelectorGroup::compile("comment.likes", &selectors.likes)?,
            dislikes: SelectorGroup::compile("comment.dislikes", &selectors.dislikes)?,
        })
    }

    fn read_comment(&self, element: &ElementRef) -> RawComment {
        let date = self.date.first_within(element).and_then(|time| {
            time.value()
                .attr("datetime")
                .map(ToString::to_string)
                .or_else(|| non_empty(element_text(&time)))
        });

        RawComment {
            author: self.author.text_within(element),
            body: self.body.text_within(element),
            date,
            likes: self.likes.text_within(element),
            dislikes: self.dislikes.text_within(element),
        }
    }

    /// Comments below one element, in page order
    pub(crate) fn read_within(&self, element: &ElementRef) -> Vec<RawComment> {
        self.item
            .select_all_within(element)
            .iter()
            .map(|comment| self.read_comment(comment))
            .collect()
    }

    /// Every comment on a review page
    pub fn parse_page(&self, html: &Html) -> Vec<ReviewComment> {
        let raw: Vec<RawComment> = self
            .item
            .select_all_in(html)
            .iter()
            .map(|comment| self.read_comment(comment))
            .collect();
        let seen = raw.len();

        let comments: Vec<ReviewComment> = raw.into_iter().filter_map(RawComment::normalize).collect();
        if comments.len() < seen {
            debug!("Dropped {} comments without text", seen - comments.len());
        }
        comments
    }
}
