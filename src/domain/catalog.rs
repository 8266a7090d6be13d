//! Catalog entities: brands and their models

use serde::{Deserialize, Serialize};

/// A car brand as listed on the reviews root page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Brand {
    /// Stable URL key, e.g. `toyota`
    pub slug: String,
    pub display_name: String,
    pub canonical_url: String,
    pub logo_url: Option<String>,
    /// Review count advertised by the site in the brand list
    pub site_review_count: u64,
    /// Number of stored reviews across all models, recomputed by the gateway
    pub review_count: u64,
}

impl Brand {
    pub fn new(slug: impl Into<String>, display_name: impl Into<String>, canonical_url: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            display_name: display_name.into(),
            canonical_url: canonical_url.into(),
            logo_url: None,
            site_review_count: 0,
            review_count: 0,
        }
    }

    pub fn with_site_review_count(mut self, count: u64) -> Self {
        self.site_review_count = count;
        self
    }

    pub fn with_logo(mut self, logo_url: impl Into<String>) -> Self {
        self.logo_url = Some(logo_url.into());
        self
    }
}

/// A model owned by a brand. Unique per `(brand_slug, slug)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    pub slug: String,
    pub brand_slug: String,
    pub display_name: String,
    pub canonical_url: String,
    /// Counts advertised on the model's review tabs, if known
    pub site_long_reviews: Option<u64>,
    pub site_short_reviews: Option<u64>,
    /// Stored review counts, recomputed by the gateway on every review write
    pub long_review_count: u64,
    pub short_review_count: u64,
}

impl Model {
    pub fn new(
        brand_slug: impl Into<String>,
        slug: impl Into<String>,
        display_name: impl Into<String>,
        canonical_url: impl Into<String>,
    ) -> Self {
        Self {
            slug: slug.into(),
            brand_slug: brand_slug.into(),
            display_name: display_name.into(),
            canonical_url: canonical_url.into(),
            site_long_reviews: None,
            site_short_reviews: None,
            long_review_count: 0,
            short_review_count: 0,
        }
    }

    /// `brand/model` key used in logs and lock names
    pub fn key(&self) -> String {
        format!("{}/{}", self.brand_slug, self.slug)
    }

    pub fn total_review_count(&self) -> u64 {
        self.long_review_count + self.short_review_count
    }
}

/// Order brands so the most reviewed ones are crawled first.
/// Ties fall back to the slug so the order is deterministic.
pub fn order_brands(brands: &mut [Brand]) {
    brands.sort_by(|a, b| {
        b.site_review_count
            .cmp(&a.site_review_count)
            .then_with(|| a.slug.cmp(&b.slug))
    });
}

/// Order models within a brand lexically by slug.
pub fn order_models(models: &mut [Model]) {
    models.sort_by(|a, b| a.slug.cmp(&b.slug));
}
