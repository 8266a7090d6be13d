//! Parsing error types
//!
//! Field-level problems never surface as errors: a missing field simply
//! stays `None`. These errors cover whole-page problems and selector
//! configuration mistakes.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParsingError {
    #[error("Invalid CSS selector '{selector}' in group '{group}': {reason}")]
    InvalidSelector {
        group: String,
        selector: String,
        reason: String,
    },

    #[error("No valid selectors compiled for group '{group}'")]
    EmptySelectorGroup { group: String },

    #[error("Expected catalog markers not found on {url}")]
    CatalogMarkersMissing { url: String },
}

impl ParsingError {
    pub fn invalid_selector(group: &str, selector: &str, reason: impl ToString) -> Self {
        Self::InvalidSelector {
            group: group.to_string(),
            selector: selector.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type ParsingResult<T> = Result<T, ParsingError>;
