//! Compiled selector groups and text helpers shared by all parsers

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use super::error::{ParsingError, ParsingResult};

/// Ordered fallback list of compiled selectors
#[derive(Debug, Clone)]
pub struct SelectorGroup {
    name: &'static str,
    selectors: Vec<Selector>,
}

impl SelectorGroup {
    /// Compile selector strings, skipping invalid ones.
    /// Fails only if none of them compile.
    pub fn compile(name: &'static str, selector_strings: &[String]) -> ParsingResult<Self> {
        let mut selectors = Vec::new();
        let mut errors = Vec::new();

        for selector_str in selector_strings {
            match Selector::parse(selector_str) {
                Ok(selector) => selectors.push(selector),
                Err(e) => {
                    warn!("Failed to compile selector '{}' for {}: {}", selector_str, name, e);
                    errors.push(ParsingError::invalid_selector(name, selector_str, e));
                }
            }
        }

        if selectors.is_empty() {
            return Err(errors
                .into_iter()
                .next()
                .unwrap_or_else(|| ParsingError::EmptySelectorGroup { group: name.to_string() }));
        }

        if !errors.is_empty() {
            debug!("{} of {} selectors failed to compile for {}", errors.len(), selector_strings.len(), name);
        }

        Ok(Self { name, selectors })
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// All matches in the document for the first selector that matches anything
    pub fn select_all_in<'a>(&self, html: &'a Html) -> Vec<ElementRef<'a>> {
        self.selectors
            .iter()
            .map(|selector| html.select(selector).collect::<Vec<_>>())
            .find(|found| !found.is_empty())
            .unwrap_or_default()
    }

    /// All matches below an element for the first selector that matches anything
    pub fn select_all_within<'a>(&self, element: &ElementRef<'a>) -> Vec<ElementRef<'a>> {
        self.selectors
            .iter()
            .map(|selector| element.select(selector).collect::<Vec<_>>())
            .find(|found| !found.is_empty())
            .unwrap_or_default()
    }

    pub fn first_within<'a>(&self, element: &ElementRef<'a>) -> Option<ElementRef<'a>> {
        self.selectors
            .iter()
            .find_map(|selector| element.select(selector).next())
    }

    pub fn first_in<'a>(&self, html: &'a Html) -> Option<ElementRef<'a>> {
        self.selectors.iter().find_map(|selector| html.select(selector).next())
    }

    /// Non-empty text of the first matching element
    pub fn text_within(&self, element: &ElementRef) -> Option<String> {
        self.selectors.iter().find_map(|selector| {
            element
                .select(selector)
                .map(|e| element_text(&e))
                .find(|text| !text.is_empty())
        })
    }
}

/// Element text with whitespace collapsed between text nodes
pub fn element_text(element: &ElementRef) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// `Some(text)` when the string is non-empty after trimming
pub fn non_empty(text: String) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == text.len() {
        Some(text)
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_skips_invalid_selectors() {
        let group = SelectorGroup::compile("title", &["h3[".to_string(), "h3".to_string()]);
        assert!(group.is_ok());
    }

    #[test]
    fn test_compile_fails_when_nothing_valid() {
        let err = SelectorGroup::compile("title", &["h3[".to_string()]);
        assert!(matches!(err, Err(ParsingError::InvalidSelector { .. })));

        let err = SelectorGroup::compile("title", &[]);
        assert_eq!(err.err(), Some(ParsingError::EmptySelectorGroup { group: "title".to_string() }));
    }

    #[test]
    fn test_fallback_order_and_text_collapse() {
        let html = Html::parse_fragment("<div><p class='b'>  second\n  choice </p></div>");
        let group = SelectorGroup::compile("body", &["p.a".to_string(), "p.b".to_string()]).unwrap();
        let root = html.root_element();

        assert_eq!(group.text_within(&root), Some("second choice".to_string()));
        assert_eq!(group.select_all_within(&root).len(), 1);
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty("  ".to_string()), None);
        assert_eq!(non_empty(" x ".to_string()), Some("x".to_string()));
    }
}
