//! HTML parsing infrastructure for drom.ru pages
//!
//! Trait-based parsers over `scraper::Html` with configurable selector
//! fallbacks. Field extraction never fails a record; page-level problems
//! surface as `ParsingError`.

pub mod catalog_parser;
pub mod comment_parser;
pub mod config;
pub mod context;
pub mod error;
pub mod long_review_parser;
pub mod review_extractor;
pub mod selectors;
pub mod short_review_parser;
pub mod text_normalizer;

pub use catalog_parser::{CatalogParser, ModelTabCounts};
pub use comment_parser::CommentParser;
pub use config::SelectorConfig;
pub use context::ExtractContext;
pub use error::{ParsingError, ParsingResult};
pub use long_review_parser::LongReviewParser;
pub use review_extractor::{PageExtraction, ReviewExtractor};
pub use short_review_parser::ShortReviewParser;

use scraper::Html;

/// Enhanced parser trait with context support
pub trait ContextualParser {
    type Output;
    type Context;

    /// Parse HTML with contextual information
    fn parse_with_context(&self, html: &Html, context: &Self::Context) -> ParsingResult<Self::Output>;
}
