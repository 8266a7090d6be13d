//! HTTP 429 handling: one rate-limited response pauses every fetch that
//! shares the gate, and the limited page is fetched again afterwards.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use common::*;
use drom_reviews_crawler::crawling::CrawlLimits;
use drom_reviews_crawler::domain::{CrawlScope, ReviewVariant, SessionStatus};
use drom_reviews_crawler::infrastructure::{PageFetcher, PageResult, RateLimitGate, RawResponse};

#[tokio::test(start_paused = true)]
async fn rate_limited_response_pauses_fetchers_sharing_the_gate() {
    let dir = TempDir::new().unwrap();
    let config = fast_config(dir.path());
    let cooldown = Duration::from_millis(config.fetch.rate_limit_cooldown_ms);
    let transport = RoutedTransport::new();
    transport.route("https://www.drom.ru/reviews/a/", vec![RawResponse::status(429)]);
    transport.page("https://www.drom.ru/reviews/b/", empty_page());

    let gate = Arc::new(RateLimitGate::new());
    let cancel = CancellationToken::new();
    let first = PageFetcher::new(transport.clone(), &config.fetch, gate.clone(), cancel.clone());
    let second = PageFetcher::new(transport.clone(), &config.fetch, gate.clone(), cancel.clone());

    let started = Instant::now();
    assert_eq!(first.fetch("https://www.drom.ru/reviews/a/").await, PageResult::RateLimited(cooldown));
    assert!(gate.is_paused());

    assert!(second.fetch("https://www.drom.ru/reviews/b/").await.is_ok());
    let calls = transport.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[1].1 >= started + cooldown);
    assert!(!gate.is_paused());
}

#[tokio::test(start_paused = true)]
async fn cancellation_releases_a_paused_fetch() {
    let dir = TempDir::new().unwrap();
    let config = fast_config(dir.path());
    let transport = RoutedTransport::new();
    let gate = Arc::new(RateLimitGate::new());
    gate.pause_for(Duration::from_secs(3600));

    let cancel = CancellationToken::new();
    let fetcher = PageFetcher::new(transport.clone(), &config.fetch, gate, cancel.clone());
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    assert!(matches!(fetcher.fetch("https://www.drom.ru/reviews/a/").await, PageResult::TransientError(_)));
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn crawl_waits_out_the_pause_and_refetches_the_limited_page() {
    let dir = TempDir::new().unwrap();
    let config = fast_config(dir.path());
    let cooldown = Duration::from_millis(config.fetch.rate_limit_cooldown_ms);
    let transport = RoutedTransport::new();
    let limited = model_url("toyota", "camry");
    transport.route(
        &limited,
        vec![
            RawResponse::status(429),
            RawResponse::ok(long_page(&[LongBlock { id: Some("1"), title: "Камри", pros: "", cons: "", body: "Хорошая." }])),
        ],
    );
    transport.page(
        &model_url("toyota", "corolla"),
        long_page(&[LongBlock { id: Some("2"), title: "Королла", pros: "", cons: "", body: "Тоже хорошая." }]),
    );

    let orchestrator = orchestrator(&config, transport.clone(), CancellationToken::new()).await.unwrap();
    seed_model(orchestrator.repository(), "toyota", "camry").await.unwrap();
    seed_model(orchestrator.repository(), "toyota", "corolla").await.unwrap();

    let session = orchestrator
        .run_review_crawl(
            &CrawlScope::brand("toyota"),
            ReviewVariant::Long,
            CrawlLimits { max_pages: 2, max_reviews_per_model: 100 },
        )
        .await
        .unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.records_saved, 2);
    assert_eq!(session.errors, 0);
    assert_eq!(transport.calls_to(&limited), 2);

    let calls = transport.calls();
    let limited_at = calls
        .iter()
        .position(|(url, _)| url == &limited)
        .unwrap();
    let resume_after = calls[limited_at].1 + cooldown;
    for (url, at) in &calls[limited_at + 1..] {
        assert!(*at >= resume_after, "{url} fetched during the pause");
    }
}

#[tokio::test]
async fn persistent_rate_limit_gives_up_on_the_page() {
    let dir = TempDir::new().unwrap();
    let mut config = fast_config(dir.path());
    config.fetch.rate_limit_cooldown_ms = 20;
    config.crawl.max_rate_limit_rounds = 1;
    let transport = RoutedTransport::new();
    transport.route(&model_url("kia", "rio"), vec![RawResponse::status(429)]);

    let orchestrator = orchestrator(&config, transport.clone(), CancellationToken::new()).await.unwrap();
    seed_model(orchestrator.repository(), "kia", "rio").await.unwrap();

    let session = orchestrator
        .run_review_crawl(
            &CrawlScope::model("kia", "rio"),
            ReviewVariant::Long,
            CrawlLimits { max_pages: 3, max_reviews_per_model: 100 },
        )
        .await
        .unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.records_saved, 0);
    assert_eq!(session.errors, 1);
    assert_eq!(transport.calls_to(&model_url("kia", "rio")), 2);
    assert!(session.error_message.is_some_and(|message| message.contains("rate limited")));
}
