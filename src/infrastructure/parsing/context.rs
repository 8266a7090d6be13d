//! Parsing context for review extraction
//!
//! Carries what the page itself does not say: which model the listing
//! belongs to and where relative links should resolve.

use std::collections::HashMap;

use crate::infrastructure::config::drom;

/// Context information for one listing page
#[derive(Debug, Clone)]
pub struct ExtractContext {
    pub brand_slug: String,
    pub model_slug: String,

    /// Canonical model page, `https://www.drom.ru/reviews/{brand}/{model}/`
    pub model_url: String,

    /// Base URL for resolving relative links
    pub base_url: String,

    /// 1-based listing page number
    pub page: u32,

    /// Additional metadata, surfaced in logs
    pub metadata: HashMap<String, String>,
}

impl ExtractContext {
    pub fn new(base_url: &str, brand_slug: &str, model_slug: &str) -> Self {
        Self {
            brand_slug: brand_slug.to_string(),
            model_slug: model_slug.to_string(),
            model_url: drom::model_url(base_url, brand_slug, model_slug),
            base_url: base_url.to_string(),
            page: 1,
            metadata: HashMap::new(),
        }
    }

    pub const fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    /// Add metadata to context
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// `brand/model#page` label for log lines
    pub fn label(&self) -> String {
        format!("{}/{}#{}", self.brand_slug, self.model_slug, self.page)
    }
}
