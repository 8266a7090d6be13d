//! Brand and model catalog parsing
//!
//! The reviews root lists brand tiles with advertised review counters; a
//! brand page links to its models; a model page carries the long/short
//! review tabs with their own counters.

use std::collections::HashSet;

use scraper::{ElementRef, Html};
use tracing::{debug, warn};
use url::Url;

use super::config::CatalogSelectors;
use super::error::{ParsingError, ParsingResult};
use super::selectors::{SelectorGroup, element_text, non_empty};
use super::text_normalizer::{parse_count, parse_trailing_count};
use crate::domain::{Brand, Model};
use crate::infrastructure::config::drom;

/// Advertised review counts from a model page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModelTabCounts {
    pub long: Option<u64>,
    pub short: Option<u64>,
}

pub struct CatalogParser {
    brand_item: SelectorGroup,
    brand_name: SelectorGroup,
    brand_counter: SelectorGroup,
    brand_link: SelectorGroup,
    brand_logo: SelectorGroup,
    model_link: SelectorGroup,
    long_reviews_tab: SelectorGroup,
    short_reviews_tab: SelectorGroup,
}

/// Path segments after `/reviews/`, e.g. `["toyota", "camry"]`
fn review_path_segments(base_url: &str, href: &str) -> Option<Vec<String>> {
    let url = Url::parse(&drom::resolve_url(base_url, href)).ok()?;
    let mut segments = url.path_segments()?.filter(|segment| !segment.is_empty());
    if segments.next()? != "reviews" {
        return None;
    }
    Some(segments.map(ToString::to_string).collect())
}

impl CatalogParser {
    pub fn new() -> ParsingResult<Self> {
        Self::with_config(&CatalogSelectors::default())
    }

    pub fn with_config(selectors: &CatalogSelectors) -> ParsingResult<Self> {
        Ok(Self {
            brand_item: SelectorGroup::compile("catalog.brand_item", &selectors.brand_item)?,
            brand_name: SelectorGroup::compile("catalog.brand_name", &selectors.brand_name)?,
            brand_counter: SelectorGroup::compile("catalog.brand_counter", &selectors.brand_counter)?,
            brand_link: SelectorGroup::compile("catalog.brand_link", &selectors.brand_link)?,
            brand_logo: SelectorGroup::compile("catalog.brand_logo", &selectors.brand_logo)?,
            model_link: SelectorGroup::compile("catalog.model_link", &selectors.model_link)?,
            long_reviews_tab: SelectorGroup::compile("catalog.long_reviews_tab", &selectors.long_reviews_tab)?,
            short_reviews_tab: SelectorGroup::compile("catalog.short_reviews_tab", &selectors.short_reviews_tab)?,
        })
    }

    /// Brand tiles of the reviews root page, in page order.
    /// A page without any brand tile means the markup changed.
    pub fn parse_brands(&self, html: &Html, base_url: &str) -> ParsingResult<Vec<Brand>> {
        let items = self.brand_item.select_all_in(html);
        if items.is_empty() {
            return Err(ParsingError::CatalogMarkersMissing {
                url: drom::reviews_root_url(base_url),
            });
        }

        let mut seen = HashSet::new();
        let brands: Vec<Brand> = items
            .iter()
            .filter_map(|item| self.parse_brand_item(item, base_url))
            .filter(|brand| seen.insert(brand.slug.clone()))
            .collect();

        debug!("Parsed {} brands from {} tiles", brands.len(), items.len());
        Ok(brands)
    }

    fn parse_brand_item(&self, item: &ElementRef, base_url: &str) -> Option<Brand> {
        let link = self.brand_link.first_within(item)?;
        let href = link.value().attr("href")?;
        let Some(slug) = review_path_segments(base_url, href).and_then(|segments| segments.into_iter().next()) else {
            warn!("Brand tile link without a reviews slug: {}", href);
            return None;
        };

        let name = self
            .brand_name
            .text_within(item)
            .or_else(|| non_empty(element_text(&link)))
            .unwrap_or_else(|| slug.clone());
        let count = self
            .brand_counter
            .text_within(item)
            .and_then(|text| parse_count(&text))
            .unwrap_or(0);

        let mut brand = Brand::new(slug.as_str(), name, drom::brand_url(base_url, &slug)).with_site_review_count(count);
        if let Some(logo) = self
            .brand_logo
            .first_within(item)
            .and_then(|img| img.value().attr("src"))
        {
            brand = brand.with_logo(drom::resolve_url(base_url, logo));
        }
        Some(brand)
    }

    /// Model links on a brand page, de-duplicated by slug
    pub fn parse_models(&self, html: &Html, brand_slug: &str, base_url: &str) -> Vec<Model> {
        let mut seen = HashSet::new();
        self.model_link
            .select_all_in(html)
            .into_iter()
            .filter_map(|link| {
                let href = link.value().attr("href")?;
                let segments = review_path_segments(base_url, href)?;
                let [brand, model] = segments.as_slice() else {
                    return None;
                };
                if brand != brand_slug || model == drom::SHORT_REVIEWS_SEGMENT || !is_slug(model) {
                    return None;
                }
                if !seen.insert(model.clone()) {
                    return None;
                }
                let name = non_empty(element_text(&link)).unwrap_or_else(|| model.replace('_', " "));
                Some(Model::new(brand_slug, model.as_str(), name, drom::model_url(base_url, brand_slug, model)))
            })
            .collect()
    }

    /// Long/short counters from the review tabs of a model page
    pub fn parse_tab_counts(&self, html: &Html) -> ModelTabCounts {
        let count_of = |group: &SelectorGroup| group.first_in(html).and_then(|tab| parse_trailing_count(&element_text(&tab)));
        ModelTabCounts {
            long: count_of(&self.long_reviews_tab),
            short: count_of(&self.short_reviews_tab),
        }
    }
}

fn is_slug(segment: &str) -> bool {
    !segment.is_empty()
        && !segment.chars().all(|c| c.is_ascii_digit())
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
