//! Long-form review listing parser
//!
//! DOM traversal runs first and copies every field into a plain
//! `LongBlock`; normalization and hashing then run on those blocks off
//! the DOM (see `review_extractor::finalize_blocks`).

use scraper::{ElementRef, Html};
use tracing::debug;

use super::comment_parser::{CommentParser, RawComment};
use super::config::{CommentSelectors, LongReviewSelectors};
use super::review_extractor::{PageExtraction, finalize_blocks};
use super::selectors::{SelectorGroup, element_text, non_empty};
use super::text_normalizer as norm;
use super::{ContextualParser, ExtractContext, ParsingResult};
use crate::domain::{Review, ReviewVariant};

/// Parser for `/reviews/{brand}/{model}/` listing pages
pub struct LongReviewParser {
    item: SelectorGroup,
    title: SelectorGroup,
    author_block: SelectorGroup,
    author: SelectorGroup,
    date: SelectorGroup,
    rating: SelectorGroup,
    pros: SelectorGroup,
    cons: SelectorGroup,
    defects: SelectorGroup,
    body: SelectorGroup,
    specs: SelectorGroup,
    photos: SelectorGroup,
    owner_ratings: SelectorGroup,
    views: SelectorGroup,
    comments: CommentParser,
}

/// Raw strings copied out of one review block
#[derive(Debug, Default)]
struct LongBlock {
    id: Option<String>,
    title: Option<String>,
    author_spans: Vec<String>,
    author_fallback: Option<String>,
    date: Option<String>,
    rating: Option<String>,
    pros: Option<String>,
    cons: Option<String>,
    defects: Option<String>,
    body: Vec<String>,
    specs: Option<String>,
    photo_sources: Vec<String>,
    rating_rows: Vec<String>,
    views: Option<String>,
    comments: Vec<RawComment>,
}

impl LongReviewParser {
    pub fn new() -> ParsingResult<Self> {
        Self::with_config(&LongReviewSelectors::default(), &CommentSelectors::default())
    }

    /// Create parser with custom selector configuration
    pub fn with_config(selectors: &LongReviewSelectors, comments: &CommentSelectors) -> ParsingResult<Self> {
        Ok(Self {
            item: SelectorGroup::compile("long_review.item", &selectors.item)?,
            title: SelectorGroup::compile("long_review.title", &selectors.title)?,
            author_block: SelectorGroup::compile("long_review.author_block", &selectors.author_block)?,
            author: SelectorGroup::compile("long_review.author", &selectors.author)?,
            date: SelectorGroup::compile("long_review.date", &selectors.date)?,
            rating: SelectorGroup::compile("long_review.rating", &selectors.rating)?,
            pros: SelectorGroup::compile("long_review.pros", &selectors.pros)?,
            cons: SelectorGroup::compile("long_review.cons", &selectors.cons)?,
            defects: SelectorGroup::compile("long_review.defects", &selectors.defects)?,
            body: SelectorGroup::compile("long_review.body", &selectors.body)?,
            specs: SelectorGroup::compile("long_review.specs", &selectors.specs)?,
            photos: SelectorGroup::compile("long_review.photos", &selectors.photos)?,
            owner_ratings: SelectorGroup::compile("long_review.owner_ratings", &selectors.owner_ratings)?,
            views: SelectorGroup::compile("long_review.views", &selectors.views)?,
            comments: CommentParser::with_config(comments)?,
        })
    }

    fn read_block(&self, element: &ElementRef) -> LongBlock {
        let date = self.date.first_within(element).and_then(|time| {
            time.value()
                .attr("datetime")
                .map(ToString::to_string)
                .or_else(|| non_empty(element_text(&time)))
        });

        let photo_sources = self
            .photos
            .select_all_within(element)
            .iter()
            .filter_map(|img| img.value().attr("src").or_else(|| img.value().attr("data-src")))
            .map(ToString::to_string)
            .collect();

        LongBlock {
            id: element.value().attr("id").and_then(|id| non_empty(id.to_string())),
            title: self.title.text_within(element),
            author_spans: self
                .author_block
                .select_all_within(element)
                .iter()
                .map(element_text)
                .filter(|text| !text.is_empty())
                .collect(),
            author_fallback: self.author.text_within(element),
            date,
            rating: self.rating.text_within(element),
            pros: self.pros.text_within(element),
            cons: self.cons.text_within(element),
            defects: self.defects.text_within(element),
            body: self
                .body
                .select_all_within(element)
                .iter()
                .map(element_text)
                .filter(|text| !text.is_empty())
                .collect(),
            specs: self.specs.text_within(element),
            photo_sources,
            rating_rows: self
                .owner_ratings
                .select_all_within(element)
                .iter()
                .map(element_text)
                .filter(|text| !text.is_empty())
                .collect(),
            views: self.views.text_within(element),
            comments: self.comments.read_within(element),
        }
    }
}

/// Author and city from the description spans, "Имя, Город" or two spans
fn split_author_city(spans: &[String]) -> (Option<String>, Option<String>) {
    let Some(first) = spans.first() else {
        return (None, None);
    };

    if let Some((author, city)) = first.split_once(',') {
        return (non_empty(author.to_string()), non_empty(city.to_string()));
    }

    let city = spans
        .get(1)
        .and_then(|span| non_empty(span.trim_start_matches(',').to_string()));
    (non_empty(first.clone()), city)
}

fn is_review_photo(src: &str) -> bool {
    src.contains("photo") || src.contains("auto.drom.ru")
}

fn build_review(block: LongBlock, ctx: &ExtractContext) -> Review {
    let source_url = match &block.id {
        Some(id) => format!("{}{}/", ctx.model_url, id),
        None => ctx.model_url.clone(),
    };
    let mut review = Review::new(&ctx.brand_slug, &ctx.model_slug, ReviewVariant::Long, source_url);

    let (author, city) = split_author_city(&block.author_spans);
    review.author = author.or(block.author_fallback);
    review.city = city;
    review.posted_at = block.date.as_deref().and_then(norm::parse_date);
    review.rating = block.rating.as_deref().and_then(norm::parse_rating);

    // Specs block when present, the title otherwise
    let specs = block.specs.as_deref().or(block.title.as_deref()).unwrap_or_default();
    review.vehicle_year = norm::parse_year(specs);
    review.engine_volume = norm::parse_engine_volume(specs);
    review.mileage_km = norm::parse_mileage_km(specs);
    review.fuel_type = norm::parse_fuel_type(specs);
    review.transmission = norm::parse_transmission(specs);
    review.drive_type = norm::parse_drive_type(specs);

    for (category, score) in block.rating_rows.iter().filter_map(|row| norm::parse_owner_rating(row)) {
        review.owner_ratings.set(category, score);
    }
    review.views_count = block
        .views
        .as_deref()
        .and_then(norm::parse_count)
        .and_then(|views| u32::try_from(views).ok());
    review.comments = block.comments.into_iter().filter_map(RawComment::normalize).collect();

    review.photo_count = block.photo_sources.iter().filter(|src| is_review_photo(src)).count() as u32;
    review.body_text = block.body.join("\n");
    review.external_id = block.id;
    review.title = block.title;
    review.pros = block.pros;
    review.cons = block.cons;
    review.defects = block.defects;
    review
}

impl ContextualParser for LongReviewParser {
    type Output = PageExtraction;
    type Context = ExtractContext;

    fn parse_with_context(&self, html: &Html, context: &Self::Context) -> ParsingResult<Self::Output> {
        let blocks: Vec<LongBlock> = self
            .item
            .select_all_in(html)
            .iter()
            .map(|element| self.read_block(element))
            .collect();

        debug!("Found {} long review blocks on {}", blocks.len(), context.label());
        Ok(finalize_blocks(blocks, |block| build_review(block, context)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
        <div data-ftid="review-item" id="1234567">
            <h3>Toyota Camry 2015 г., 2.5 л</h3>
            <div data-ftid="component_review_descrption">
                <span class="_1ngifes0">Сергей, Владивосток</span>
            </div>
            <time datetime="2021-03-04">4 марта 2021</time>
            <div data-ftid="component_rating">4.5</div>
            <div class="css-1ymyv8x">Год выпуска 2015 г. Двигатель бензин, 2.5 л Коробка автомат Привод передний Пробег 120 тыс. км</div>
            <div data-ftid="review-content__positive">Надёжность</div>
            <div data-ftid="review-content__negative">Шумоизоляция</div>
            <div data-ftid="review-content__general">Первый абзац отзыва.</div>
            <div data-ftid="review-content__general">Второй абзац отзыва.</div>
            <img src="https://s.auto.drom.ru/i24/photo1.jpg">
            <img src="/static/icon.svg">
            <table data-ftid="review-item__ratings">
                <tr><td>Внешний вид</td><td>5</td></tr>
                <tr><td>Салон</td><td>4</td></tr>
                <tr><td>Двигатель</td><td>4</td></tr>
                <tr><td>Ходовые качества</td><td>3</td></tr>
            </table>
            <span data-ftid="review-item__views">12 554 просмотра</span>
            <div data-ftid="review-comment">
                <a data-ftid="review-comment__author">Павел</a>
                <div data-ftid="review-comment__text">Согласен насчёт шумоизоляции.</div>
                <span data-ftid="review-comment__likes">3</span>
            </div>
        </div>
        </body></html>
    "#;

    #[test]
    fn test_parse_full_block() {
        let parser = LongReviewParser::new().unwrap();
        let ctx = ExtractContext::new("https://www.drom.ru", "toyota", "camry");
        let result = parser.parse_with_context(&Html::parse_document(PAGE), &ctx).unwrap();

        assert_eq!(result.blocks_seen, 1);
        assert_eq!(result.reviews.len(), 1);
        let review = &result.reviews[0];
        assert_eq!(review.external_id.as_deref(), Some("1234567"));
        assert_eq!(review.source_url, "https://www.drom.ru/reviews/toyota/camry/1234567/");
        assert_eq!(review.author.as_deref(), Some("Сергей"));
        assert_eq!(review.city.as_deref(), Some("Владивосток"));
        assert_eq!(review.posted_at, chrono::NaiveDate::from_ymd_opt(2021, 3, 4));
        assert_eq!(review.rating, Some(4.5));
        assert_eq!(review.vehicle_year, Some(2015));
        assert_eq!(review.engine_volume, Some(2.5));
        assert_eq!(review.mileage_km, Some(120_000));
        assert_eq!(review.fuel_type.as_deref(), Some("бензин"));
        assert_eq!(review.transmission.as_deref(), Some("автомат"));
        assert_eq!(review.drive_type.as_deref(), Some("передний"));
        assert_eq!(review.photo_count, 1);
        assert_eq!(review.body_text, "Первый абзац отзыва.\nВторой абзац отзыва.");
        assert!(!review.content_hash.is_empty());

        assert_eq!(review.owner_ratings.exterior, Some(5));
        assert_eq!(review.owner_ratings.interior, Some(4));
        assert_eq!(review.owner_ratings.engine, Some(4));
        assert_eq!(review.owner_ratings.driving, Some(3));
        assert_eq!(review.views_count, Some(12_554));
        assert_eq!(review.comments.len(), 1);
        assert_eq!(review.comments[0].author.as_deref(), Some("Павел"));
        assert_eq!(review.comments[0].likes, 3);
    }

    #[test]
    fn test_missing_fields_do_not_drop_record() {
        let page = r#"<div data-ftid="review-item">
            <div class="css-6hj46s">Только текст отзыва без остальных полей, но достаточно длинный.</div>
        </div>"#;
        let parser = LongReviewParser::new().unwrap();
        let ctx = ExtractContext::new("https://www.drom.ru", "lada", "vesta");
        let result = parser.parse_with_context(&Html::parse_document(page), &ctx).unwrap();

        assert_eq!(result.reviews.len(), 1);
        let review = &result.reviews[0];
        assert_eq!(review.external_id, None);
        assert_eq!(review.author, None);
        assert_eq!(review.engine_volume, None);
        assert_eq!(review.source_url, "https://www.drom.ru/reviews/lada/vesta/");
        assert!(review.owner_ratings.is_empty());
        assert_eq!(review.views_count, None);
        assert!(review.comments.is_empty());
    }

    #[test]
    fn test_author_city_from_separate_spans() {
        let spans = vec!["Иван".to_string(), ", Омск".to_string()];
        assert_eq!(
            split_author_city(&spans),
            (Some("Иван".to_string()), Some("Омск".to_string()))
        );
        assert_eq!(split_author_city(&[]), (None, None));
    }
}
