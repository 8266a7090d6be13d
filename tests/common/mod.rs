//! Shared helpers for integration tests: a routed in-memory transport,
//! a fast configuration and HTML fixtures shaped like drom.ru pages.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use drom_reviews_crawler::crawling::CrawlOrchestrator;
use drom_reviews_crawler::domain::{Brand, Model};
use drom_reviews_crawler::infrastructure::{
    AppConfig, DatabaseConnection, FetchFailure, HttpTransport, RawResponse, ReviewRepository,
};

pub const BASE: &str = "https://www.drom.ru";

/// Per-URL response scripts. A URL with an exhausted script keeps
/// returning its last response; unknown URLs get 404.
#[derive(Default)]
pub struct RoutedTransport {
    routes: Mutex<HashMap<String, VecDeque<RawResponse>>>,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl RoutedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn route(&self, url: &str, responses: Vec<RawResponse>) {
        self.routes.lock().unwrap().insert(url.to_string(), responses.into());
    }

    pub fn page(&self, url: &str, body: String) {
        self.route(url, vec![RawResponse::ok(body)]);
    }

    pub fn calls(&self) -> Vec<(String, Instant)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(called, _)| called == url).count()
    }
}

#[async_trait]
impl HttpTransport for RoutedTransport {
    async fn get(&self, url: &str, _headers: &[(&'static str, String)]) -> Result<RawResponse, FetchFailure> {
        self.calls.lock().unwrap().push((url.to_string(), Instant::now()));
        let mut routes = self.routes.lock().unwrap();
        let Some(script) = routes.get_mut(url) else {
            return Ok(RawResponse::status(404));
        };
        let response = if script.len() > 1 { script.pop_front() } else { script.front().cloned() };
        Ok(response.unwrap_or_else(|| RawResponse::status(404)))
    }
}

/// No politeness delay, one quick retry, no global quota
pub fn fast_config(dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.fetch.min_delay_ms = 0;
    config.fetch.max_delay_ms = 0;
    config.fetch.max_retries = 1;
    config.fetch.backoff_base_ms = 10;
    config.fetch.backoff_ceiling_ms = 20;
    config.fetch.rate_limit_cooldown_ms = 300;
    config.fetch.requests_per_minute = 0;
    config.crawl.max_workers = 2;
    config.crawl.queue_capacity = 4;
    config.crawl.max_long_pages = 5;
    config.crawl.max_short_pages = 5;
    config.crawl.catalog_cache_path = dir.join("catalog_cache.json");
    config.database.url = format!("sqlite:{}", dir.join("crawler.db").display());
    config
}

pub async fn repository(config: &AppConfig) -> Result<ReviewRepository> {
    let db = DatabaseConnection::from_config(&config.database).await?;
    db.migrate().await?;
    Ok(ReviewRepository::new(db.pool().clone()).with_completeness_threshold(config.crawl.completeness_threshold))
}

pub async fn orchestrator(
    config: &AppConfig,
    transport: Arc<RoutedTransport>,
    cancel: CancellationToken,
) -> Result<CrawlOrchestrator> {
    let repository = repository(config).await?;
    Ok(CrawlOrchestrator::new(Arc::new(config.clone()), transport, repository, cancel).await?)
}

pub async fn seed_model(repository: &ReviewRepository, brand: &str, model: &str) -> Result<()> {
    repository
        .upsert_brand(&Brand::new(brand, brand, format!("{BASE}/reviews/{brand}/")))
        .await?;
    repository
        .upsert_model(&Model::new(brand, model, model, format!("{BASE}/reviews/{brand}/{model}/")))
        .await?;
    Ok(())
}

pub fn model_url(brand: &str, model: &str) -> String {
    format!("{BASE}/reviews/{brand}/{model}/")
}

pub fn short_url(brand: &str, model: &str) -> String {
    format!("{BASE}/reviews/{brand}/{model}/5kopeek/")
}

/// One long-form review block
pub struct LongBlock<'a> {
    pub id: Option<&'a str>,
    pub title: &'a str,
    pub pros: &'a str,
    pub cons: &'a str,
    pub body: &'a str,
}

pub fn long_page(blocks: &[LongBlock]) -> String {
    let items: String = blocks
        .iter()
        .map(|block| {
            let id = block.id.map(|id| format!(" id=\"{id}\"")).unwrap_or_default();
            format!(
                r#"<div data-ftid="review-item"{id}>
                    <h3>{}</h3>
                    <div data-ftid="review-content__positive">{}</div>
                    <div data-ftid="review-content__negative">{}</div>
                    <div data-ftid="review-content__general">{}</div>
                </div>"#,
                block.title, block.pros, block.cons, block.body
            )
        })
        .collect();
    format!("<html><body>{items}</body></html>")
}

/// Short review blocks as `(id, pros, cons)`; empty texts leave the body empty
pub fn short_page(blocks: &[(&str, &str, &str)]) -> String {
    let items: String = blocks
        .iter()
        .map(|(id, pros, cons)| {
            let mut item = format!(
                r#"<div data-ftid="short-review-item" id="{id}">
                    <div data-ftid="short-review-item__title">Toyota Camry <span data-ftid="short-review-item__year">2012</span> год, <span data-ftid="short-review-item__volume">2.4</span> л, бензин, автомат, передний</div>
                    <div class="css-987tv1"><span>Иван</span><span>12.02.2020</span><span>Омск</span></div>"#
            );
            if !pros.is_empty() {
                item.push_str(&format!(r#"<div data-ftid="short-review-content__positive">{pros}</div>"#));
            }
            if !cons.is_empty() {
                item.push_str(&format!(r#"<div data-ftid="short-review-content__negative">{cons}</div>"#));
            }
            item.push_str("</div>");
            item
        })
        .collect();
    format!("<html><body>{items}</body></html>")
}

pub fn empty_page() -> String {
    "<html><body><p>Отзывов пока нет</p></body></html>".to_string()
}

/// Reviews root with brand tiles as `(slug, name, advertised count)`
pub fn brands_page(brands: &[(&str, &str, u64)]) -> String {
    let tiles: String = brands
        .iter()
        .map(|(slug, name, count)| {
            format!(
                r#"<div class="frg44i0">
                    <a data-ftid="component_cars-list-item_hidden-link" href="/reviews/{slug}/"></a>
                    <span data-ftid="component_cars-list-item_name">{name}</span>
                    <span data-ftid="component_cars-list-item_counter">{count}</span>
                </div>"#
            )
        })
        .collect();
    format!(r#"<html><body><div data-ftid="component_cars-list">{tiles}</div></body></html>"#)
}

pub fn models_page(brand: &str, models: &[&str]) -> String {
    let links: String = models
        .iter()
        .map(|model| format!(r#"<a href="/reviews/{brand}/{model}/">{model}</a>"#))
        .collect();
    format!("<html><body>{links}</body></html>")
}

/// A single review page carrying reader comments as `(author, text)`
pub fn comments_page(comments: &[(&str, &str)]) -> String {
    let items: String = comments
        .iter()
        .map(|(author, text)| {
            format!(
                r#"<div data-ftid="review-comment">
                    <a data-ftid="review-comment__author">{author}</a>
                    <div data-ftid="review-comment__text">{text}</div>
                    <span data-ftid="review-comment__likes">2</span>
                </div>"#
            )
        })
        .collect();
    format!("<html><body><article>Текст отзыва</article>{items}</body></html>")
}
