//! Short review ("5 копеек") listing parser

use scraper::{ElementRef, Html};
use tracing::debug;

use super::config::ShortReviewSelectors;
use super::review_extractor::{PageExtraction, finalize_blocks};
use super::selectors::{SelectorGroup, element_text, non_empty};
use super::text_normalizer as norm;
use super::{ContextualParser, ExtractContext, ParsingResult};
use crate::domain::{Review, ReviewVariant};
use crate::infrastructure::config::drom;

pub struct ShortReviewParser {
    item: SelectorGroup,
    title: SelectorGroup,
    year: SelectorGroup,
    volume: SelectorGroup,
    author_info: SelectorGroup,
    author: SelectorGroup,
    city: SelectorGroup,
    pros: SelectorGroup,
    cons: SelectorGroup,
    defects: SelectorGroup,
    photos: SelectorGroup,
}

#[derive(Debug, Default)]
struct ShortBlock {
    id: Option<String>,
    title: Option<String>,
    year: Option<String>,
    volume: Option<String>,
    /// author, date, city in page order
    info_spans: Vec<String>,
    author: Option<String>,
    city: Option<String>,
    pros: Option<String>,
    cons: Option<String>,
    defects: Option<String>,
    photo_count: usize,
}

impl ShortReviewParser {
    pub fn new() -> ParsingResult<Self> {
        Self::with_config(&ShortReviewSelectors::default())
    }

    pub fn with_config(selectors: &ShortReviewSelectors) -> ParsingResult<Self> {
        Ok(Self {
            item: SelectorGroup::compile("short_review.item", &selectors.item)?,
            title: SelectorGroup::compile("short_review.title", &selectors.title)?,
            year: SelectorGroup::compile("short_review.year", &selectors.year)?,
            volume: SelectorGroup::compile("short_review.volume", &selectors.volume)?,
            author_info: SelectorGroup::compile("short_review.author_info", &selectors.author_info)?,
            author: SelectorGroup::compile("short_review.author", &selectors.author)?,
            city: SelectorGroup::compile("short_review.city", &selectors.city)?,
            pros: SelectorGroup::compile("short_review.pros", &selectors.pros)?,
            cons: SelectorGroup::compile("short_review.cons", &selectors.cons)?,
            defects: SelectorGroup::compile("short_review.defects", &selectors.defects)?,
            photos: SelectorGroup::compile("short_review.photos", &selectors.photos)?,
        })
    }

    fn read_block(&self, element: &ElementRef) -> ShortBlock {
        let info_spans = self
            .author_info
            .first_within(element)
            .map(|info| {
                info.children()
                    .filter_map(ElementRef::wrap)
                    .map(|span| element_text(&span))
                    .filter(|text| !text.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        ShortBlock {
            id: element.value().attr("id").and_then(|id| non_empty(id.to_string())),
            title: self.title.text_within(element),
            year: self.year.text_within(element),
            volume: self.volume.text_within(element),
            info_spans,
            author: self.author.text_within(element),
            city: self.city.text_within(element),
            pros: self.pros.text_within(element),
            cons: self.cons.text_within(element),
            defects: self.defects.text_within(element),
            photo_count: self.photos.select_all_within(element).len(),
        }
    }
}

fn build_review(block: ShortBlock, ctx: &ExtractContext) -> Review {
    let listing = format!("{}{}/", ctx.model_url, drom::SHORT_REVIEWS_SEGMENT);
    let source_url = match &block.id {
        Some(id) => format!("{listing}{id}/"),
        None => listing,
    };
    let mut review = Review::new(&ctx.brand_slug, &ctx.model_slug, ReviewVariant::Short, source_url);

    review.external_id = block.id.as_ref().map(|id| format!("short_{id}"));
    review.author = block.author.or_else(|| block.info_spans.first().cloned());
    review.posted_at = block.info_spans.get(1).and_then(|date| norm::parse_date(date));
    review.city = block.city.or_else(|| block.info_spans.get(2).cloned());

    // "2001 год, 1.5 л, бензин, автомат, передний"
    let title = block.title.as_deref().unwrap_or_default();
    review.vehicle_year = block
        .year
        .as_deref()
        .and_then(norm::parse_year)
        .or_else(|| norm::parse_year(title));
    review.engine_volume = block
        .volume
        .as_deref()
        .and_then(norm::parse_engine_volume)
        .or_else(|| norm::parse_engine_volume(title));
    review.mileage_km = norm::parse_mileage_km(title);
    review.fuel_type = norm::parse_fuel_type(title);
    review.transmission = norm::parse_transmission(title);
    review.drive_type = norm::parse_drive_type(title);
    review.photo_count = block.photo_count as u32;

    review.body_text = [&block.pros, &block.cons, &block.defects]
        .into_iter()
        .flatten()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n");
    review.title = block.title;
    review.pros = block.pros;
    review.cons = block.cons;
    review.defects = block.defects;
    review
}

impl ContextualParser for ShortReviewParser {
    type Output = PageExtraction;
    type Context = ExtractContext;

    fn parse_with_context(&self, html: &Html, context: &Self::Context) -> ParsingResult<Self::Output> {
        let blocks: Vec<ShortBlock> = self
            .item
            .select_all_in(html)
            .iter()
            .map(|element| self.read_block(element))
            .collect();

        debug!("Found {} short review blocks on {}", blocks.len(), context.label());
        Ok(finalize_blocks(blocks, |block| build_review(block, context)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK: &str = r#"
        <div data-ftid="short-review-item" id="98765">
            <div data-ftid="short-review-item__title">
                Toyota Corolla <span data-ftid="short-review-item__year">2001</span> год,
                <span data-ftid="short-review-item__volume">1.5</span> л, бензин, автомат, передний
            </div>
            <div class="css-987tv1"><span>Алексей</span><span>12.02.2020</span><span>Хабаровск</span></div>
            <div data-ftid="short-review-content__positive">Экономичная и надёжная машина</div>
            <div data-ftid="short-review-content__negative">Жёсткая подвеска</div>
            <div class="_1gzw4372"><img src="https://s.auto.drom.ru/photo/1.jpg"></div>
        </div>
    "#;

    #[test]
    fn test_parse_title_specs_and_info_spans() {
        let parser = ShortReviewParser::new().unwrap();
        let ctx = ExtractContext::new("https://www.drom.ru", "toyota", "corolla");
        let result = parser.parse_with_context(&Html::parse_document(BLOCK), &ctx).unwrap();

        let review = &result.reviews[0];
        assert_eq!(review.external_id.as_deref(), Some("short_98765"));
        assert_eq!(review.source_url, "https://www.drom.ru/reviews/toyota/corolla/5kopeek/98765/");
        assert_eq!(review.variant, ReviewVariant::Short);
        assert_eq!(review.author.as_deref(), Some("Алексей"));
        assert_eq!(review.city.as_deref(), Some("Хабаровск"));
        assert_eq!(review.posted_at, chrono::NaiveDate::from_ymd_opt(2020, 2, 12));
        assert_eq!(review.vehicle_year, Some(2001));
        assert_eq!(review.engine_volume, Some(1.5));
        assert_eq!(review.fuel_type.as_deref(), Some("бензин"));
        assert_eq!(review.transmission.as_deref(), Some("автомат"));
        assert_eq!(review.drive_type.as_deref(), Some("передний"));
        assert_eq!(review.photo_count, 1);
        assert_eq!(review.body_text, "Экономичная и надёжная машина\nЖёсткая подвеска");
    }

    #[test]
    fn test_block_without_text_is_discarded() {
        let page = format!(
            "{BLOCK}<div data-ftid=\"short-review-item\" id=\"1\"><div data-ftid=\"short-review-item__title\">Toyota Corolla</div></div>"
        );
        let parser = ShortReviewParser::new().unwrap();
        let ctx = ExtractContext::new("https://www.drom.ru", "toyota", "corolla");
        let result = parser.parse_with_context(&Html::parse_document(&page), &ctx).unwrap();

        assert_eq!(result.blocks_seen, 2);
        assert_eq!(result.reviews.len(), 1);
        assert_eq!(result.discarded, 1);
    }
}
