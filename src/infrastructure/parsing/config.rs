//! Parsing configuration for HTML extraction
//!
//! Every marker the extractor relies on lives here as an ordered list of
//! CSS selectors. The first selector that matches wins, so a site markup
//! change can be handled by prepending a new selector in the config file.

use serde::{Deserialize, Serialize};

/// All selector groups
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub catalog: CatalogSelectors,
    pub long_review: LongReviewSelectors,
    pub short_review: ShortReviewSelectors,
    pub comment: CommentSelectors,
}

/// Brand list and model list markers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSelectors {
    /// One brand tile in the reviews root page
    pub brand_item: Vec<String>,
    pub brand_name: Vec<String>,
    pub brand_counter: Vec<String>,
    pub brand_link: Vec<String>,
    pub brand_logo: Vec<String>,

    /// Candidate links to a model page on a brand page
    pub model_link: Vec<String>,

    /// Review tabs on a model page carrying advertised counts
    pub long_reviews_tab: Vec<String>,
    pub short_reviews_tab: Vec<String>,
}

/// Long-form review markers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LongReviewSelectors {
    pub item: Vec<String>,
    pub title: Vec<String>,
    pub author_block: Vec<String>,
    pub author: Vec<String>,
    pub date: Vec<String>,
    pub rating: Vec<String>,
    pub pros: Vec<String>,
    pub cons: Vec<String>,
    pub defects: Vec<String>,
    /// Main text; all matches of the first matching selector are joined
    pub body: Vec<String>,
    pub specs: Vec<String>,
    pub photos: Vec<String>,
    /// One owner score row, "Двигатель 4"
    pub owner_ratings: Vec<String>,
    pub views: Vec<String>,
}

/// Reader comment markers, on a review page or inside a listing block
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommentSelectors {
    pub item: Vec<String>,
    pub author: Vec<String>,
    pub body: Vec<String>,
    pub date: Vec<String>,
    pub likes: Vec<String>,
    pub dislikes: Vec<String>,
}

/// Short review markers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShortReviewSelectors {
    pub item: Vec<String>,
    pub title: Vec<String>,
    pub year: Vec<String>,
    pub volume: Vec<String>,
    pub author_info: Vec<String>,
    pub author: Vec<String>,
    pub city: Vec<String>,
    pub pros: Vec<String>,
    pub cons: Vec<String>,
    pub defects: Vec<String>,
    pub photos: Vec<String>,
}

fn list(selectors: &[&str]) -> Vec<String> {
    selectors.iter().map(ToString::to_string).collect()
}

impl Default for CatalogSelectors {
    fn default() -> Self {
        Self {
            brand_item: list(&[
                "div[data-ftid=component_cars-list] div.frg44i0",
                "div[data-ftid=component_cars-list] > div",
            ]),
            brand_name: list(&["span[data-ftid=component_cars-list-item_name]"]),
            brand_counter: list(&["span[data-ftid=component_cars-list-item_counter]"]),
            brand_link: list(&["a[data-ftid=component_cars-list-item_hidden-link]", "a[href]"]),
            brand_logo: list(&["img[src]"]),
            model_link: list(&["a[href]"]),
            long_reviews_tab: list(&["a[data-ftid=reviews_tab_button_long_reviews]"]),
            short_reviews_tab: list(&["a[data-ftid=reviews_tab_button_short_reviews]"]),
        }
    }
}

impl Default for LongReviewSelectors {
    fn default() -> Self {
        Self {
            item: list(&["article[data-ftid=review-item]", "div[data-ftid=review-item]"]),
            title: list(&["h3", "[data-ftid=review-item__title]"]),
            author_block: list(&["div[data-ftid=component_review_descrption] span._1ngifes0"]),
            author: list(&["span.css-1u4ddp"]),
            date: list(&["time[datetime]", "time"]),
            rating: list(&["div[data-ftid=component_rating]"]),
            pros: list(&["div[data-ftid=review-content__positive]"]),
            cons: list(&["div[data-ftid=review-content__negative]"]),
            defects: list(&["div[data-ftid=review-content__breakages]"]),
            body: list(&["div[data-ftid=review-content__general]", "div.css-6hj46s", "div.hxiweg0"]),
            specs: list(&["div.css-1ymyv8x", "table[data-ftid=review-item__specs]"]),
            photos: list(&["img"]),
            owner_ratings: list(&[
                "table[data-ftid=review-item__ratings] tr",
                "div[data-ftid=review-item__rating-row]",
                "table.drom-table tr",
            ]),
            views: list(&["span[data-ftid=review-item__views]", "span.b-text-gray"]),
        }
    }
}

impl Default for CommentSelectors {
    fn default() -> Self {
        Self {
            item: list(&["div[data-ftid=review-comment]", "div.b-comments-item"]),
            author: list(&["[data-ftid=review-comment__author]", "a.b-comments-item__author"]),
            body: list(&["div[data-ftid=review-comment__text]", "div.b-comments-item__text"]),
            date: list(&["time[datetime]", "time"]),
            likes: list(&["[data-ftid=review-comment__likes]"]),
            dislikes: list(&["[data-ftid=review-comment__dislikes]"]),
        }
    }
}

impl Default for ShortReviewSelectors {
    fn default() -> Self {
        Self {
            item: list(&["div[data-ftid=short-review-item]"]),
            title: list(&["div[data-ftid=short-review-item__title]"]),
            year: list(&["span[data-ftid=short-review-item__year]"]),
            volume: list(&["span[data-ftid=short-review-item__volume]"]),
            author_info: list(&["div.css-987tv1"]),
            author: list(&["span.css-1u4ddp"]),
            city: list(&["span[data-ftid=short-review-city]"]),
            pros: list(&["div[data-ftid=short-review-content__positive]"]),
            cons: list(&["div[data-ftid=short-review-content__negative]"]),
            defects: list(&["div[data-ftid=short-review-content__breakages]"]),
            photos: list(&["div._1gzw4372 img[src]", "img.css-1e2elm8"]),
        }
    }
}
