//! Review extraction entry point, dispatching on the listing variant

use rayon::prelude::*;
use scraper::Html;
use tracing::{debug, info};

use super::comment_parser::CommentParser;
use super::config::SelectorConfig;
use super::{ContextualParser, ExtractContext, LongReviewParser, ParsingResult, ShortReviewParser};
use crate::domain::{Review, ReviewComment, ReviewVariant};

/// Records produced from one fetched listing page
#[derive(Debug, Clone, Default)]
pub struct PageExtraction {
    pub reviews: Vec<Review>,

    /// Review blocks found in the markup, including discarded ones
    pub blocks_seen: usize,

    /// Blocks with no identity or an empty body
    pub discarded: usize,
}

impl PageExtraction {
    /// A page without review blocks marks the end of pagination
    pub const fn is_exhausted(&self) -> bool {
        self.blocks_seen == 0
    }
}

/// Normalize raw blocks in parallel and keep only identifiable records.
/// Output order follows block order on the page.
pub(crate) fn finalize_blocks<B, F>(blocks: Vec<B>, build: F) -> PageExtraction
where
    B: Send,
    F: Fn(B) -> Review + Sync + Send,
{
    let blocks_seen = blocks.len();
    let reviews: Vec<Review> = blocks
        .into_par_iter()
        .filter_map(|block| {
            let mut review = build(block);
            review.refresh_content_hash();
            if review.body_text.trim().is_empty() || !review.has_identity() {
                debug!("Discarding review block without body or identity on {}", review.model_key());
                return None;
            }
            Some(review)
        })
        .collect();

    PageExtraction {
        discarded: blocks_seen - reviews.len(),
        blocks_seen,
        reviews,
    }
}

/// Polymorphic over the closed variant set; callers pass the variant
/// they requested instead of relying on markup sniffing
pub struct ReviewExtractor {
    long: LongReviewParser,
    short: ShortReviewParser,
    comments: CommentParser,
}

impl ReviewExtractor {
    pub fn new(selectors: &SelectorConfig) -> ParsingResult<Self> {
        Ok(Self {
            long: LongReviewParser::with_config(&selectors.long_review, &selectors.comment)?,
            short: ShortReviewParser::with_config(&selectors.short_review)?,
            comments: CommentParser::with_config(&selectors.comment)?,
        })
    }

    /// Reader comments on a single review page
    pub fn extract_comments(&self, page_body: &str) -> Vec<ReviewComment> {
        let html = Html::parse_document(page_body);
        self.comments.parse_page(&html)
    }

    pub fn extract(&self, page_body: &str, variant: ReviewVariant, context: &ExtractContext) -> ParsingResult<PageExtraction> {
        let html = Html::parse_document(page_body);
        let extraction = match variant {
            ReviewVariant::Long => self.long.parse_with_context(&html, context)?,
            ReviewVariant::Short => self.short.parse_with_context(&html, context)?,
        };

        if extraction.discarded > 0 {
            info!(
                "📄 {} {}: {} reviews, {} blocks discarded",
                variant,
                context.label(),
                extraction.reviews.len(),
                extraction.discarded
            );
        }
        Ok(extraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_page_is_exhausted() {
        let extractor = ReviewExtractor::new(&SelectorConfig::default()).unwrap();
        let ctx = ExtractContext::new("https://www.drom.ru", "kia", "rio").with_page(7);

        for variant in ReviewVariant::ALL {
            let result = extractor.extract("<html><body><p>Нет отзывов</p></body></html>", variant, &ctx).unwrap();
            assert!(result.is_exhausted());
            assert!(result.reviews.is_empty());
        }
    }

    #[test]
    fn test_finalize_preserves_block_order() {
        let texts: Vec<String> = (0..50).map(|i| format!("Отзыв номер {i} с достаточным количеством текста")).collect();
        let extraction = finalize_blocks(texts, |text| {
            let mut review = Review::new("kia", "rio", ReviewVariant::Long, String::new());
            review.body_text = text;
            review
        });

        assert_eq!(extraction.reviews.len(), 50);
        assert!(extraction.reviews[7].body_text.starts_with("Отзыв номер 7 "));
        assert_eq!(extraction.discarded, 0);
    }
}
