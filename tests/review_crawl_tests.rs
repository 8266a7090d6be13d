//! End-to-end review crawls against scripted pages: insert, idempotent
//! re-crawl, completeness upgrades, malformed short blocks and the
//! per-model counters.

mod common;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use common::*;
use drom_reviews_crawler::crawling::CrawlLimits;
use drom_reviews_crawler::domain::{CrawlScope, ReviewVariant, SessionKind, SessionStatus};

const LONG_BODY: &str = "Машина досталась с пробегом сто двадцать тысяч. За три года эксплуатации \
                         менял только расходники, подвеска живая, двигатель масло не ест.";

fn limits(max_pages: u32) -> CrawlLimits {
    CrawlLimits { max_pages, max_reviews_per_model: 1000 }
}

#[tokio::test]
async fn long_review_without_site_id_is_inserted_then_skipped() {
    let dir = TempDir::new().unwrap();
    let config = fast_config(dir.path());
    let transport = RoutedTransport::new();
    transport.page(
        &model_url("toyota", "camry"),
        long_page(&[LongBlock { id: None, title: "Отличная машина", pros: "Надёжность", cons: "Шумоизоляция", body: LONG_BODY }]),
    );
    transport.page(&format!("{}?p=2", model_url("toyota", "camry")), empty_page());

    let orchestrator = orchestrator(&config, transport.clone(), CancellationToken::new()).await.unwrap();
    seed_model(orchestrator.repository(), "toyota", "camry").await.unwrap();
    let scope = CrawlScope::model("toyota", "camry");

    let first = orchestrator.run_review_crawl(&scope, ReviewVariant::Long, limits(5)).await.unwrap();
    assert_eq!(first.status, SessionStatus::Completed);
    assert_eq!(first.kind, SessionKind::LongReviews);
    assert_eq!(first.records_found, 1);
    assert_eq!(first.records_saved, 1);
    assert_eq!(first.errors, 0);

    let stored = orchestrator.repository().list_reviews("toyota", "camry").await.unwrap();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].external_id.is_none());
    assert!(stored[0].identity().key().starts_with("hash:"));
    assert_eq!(stored[0].title.as_deref(), Some("Отличная машина"));

    let second = orchestrator.run_review_crawl(&scope, ReviewVariant::Long, limits(5)).await.unwrap();
    assert_eq!(second.status, SessionStatus::Completed);
    assert_eq!(second.records_found, 1);
    assert_eq!(second.records_saved, 0);
    assert_eq!(orchestrator.repository().list_reviews("toyota", "camry").await.unwrap().len(), 1);

    let model = orchestrator.repository().find_model("toyota", "camry").await.unwrap().unwrap();
    assert_eq!(model.long_review_count, 1);
    assert_eq!(model.short_review_count, 0);
}

#[tokio::test]
async fn richer_copy_replaces_in_place_and_poorer_copy_is_ignored() {
    let dir = TempDir::new().unwrap();
    let config = fast_config(dir.path());
    let transport = RoutedTransport::new();
    let url = model_url("lada", "vesta");
    let orchestrator = orchestrator(&config, transport.clone(), CancellationToken::new()).await.unwrap();
    seed_model(orchestrator.repository(), "lada", "vesta").await.unwrap();
    let scope = CrawlScope::model("lada", "vesta");

    transport.page(&url, long_page(&[LongBlock { id: Some("555"), title: "Кратко", pros: "", cons: "", body: "Нормально." }]));
    orchestrator.run_review_crawl(&scope, ReviewVariant::Long, limits(1)).await.unwrap();

    transport.page(
        &url,
        long_page(&[LongBlock { id: Some("555"), title: "Подробно", pros: "Цена", cons: "Шумно", body: LONG_BODY }]),
    );
    let upgraded = orchestrator.run_review_crawl(&scope, ReviewVariant::Long, limits(1)).await.unwrap();
    assert_eq!(upgraded.records_saved, 1);

    transport.page(&url, long_page(&[LongBlock { id: Some("555"), title: "Кратко", pros: "", cons: "", body: "Нормально." }]));
    let downgraded = orchestrator.run_review_crawl(&scope, ReviewVariant::Long, limits(1)).await.unwrap();
    assert_eq!(downgraded.records_saved, 0);

    let stored = orchestrator.repository().list_reviews("lada", "vesta").await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].external_id.as_deref(), Some("555"));
    assert_eq!(stored[0].body_text, LONG_BODY);
    assert_eq!(stored[0].pros.as_deref(), Some("Цена"));
}

#[tokio::test]
async fn malformed_short_block_is_dropped_and_the_rest_saved() {
    let dir = TempDir::new().unwrap();
    let config = fast_config(dir.path());
    let transport = RoutedTransport::new();
    transport.page(
        &short_url("toyota", "camry"),
        short_page(&[
            ("9001", "Экономичная и надёжная машина", "Жёсткая подвеска"),
            ("9002", "", ""),
            ("9003", "Вместительный багажник", ""),
        ]),
    );

    let orchestrator = orchestrator(&config, transport.clone(), CancellationToken::new()).await.unwrap();
    seed_model(orchestrator.repository(), "toyota", "camry").await.unwrap();

    let session = orchestrator
        .run_review_crawl(&CrawlScope::model("toyota", "camry"), ReviewVariant::Short, limits(1))
        .await
        .unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.kind, SessionKind::ShortReviews);
    assert_eq!(session.records_found, 2);
    assert_eq!(session.records_saved, 2);

    let mut ids: Vec<_> = orchestrator
        .repository()
        .list_reviews("toyota", "camry")
        .await
        .unwrap()
        .into_iter()
        .map(|review| review.external_id.unwrap_or_default())
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["short_9001", "short_9003"]);

    let model = orchestrator.repository().find_model("toyota", "camry").await.unwrap().unwrap();
    assert_eq!(model.short_review_count, 2);
}

#[tokio::test]
async fn brand_scope_crawls_every_model_and_counters_add_up() {
    let dir = TempDir::new().unwrap();
    let config = fast_config(dir.path());
    let transport = RoutedTransport::new();
    let orchestrator = orchestrator(&config, transport.clone(), CancellationToken::new()).await.unwrap();
    for model in ["camry", "corolla", "rav4"] {
        seed_model(orchestrator.repository(), "toyota", model).await.unwrap();
    }

    transport.page(
        &model_url("toyota", "camry"),
        long_page(&[
            LongBlock { id: Some("1"), title: "Первый", pros: "", cons: "", body: LONG_BODY },
            LongBlock { id: Some("2"), title: "Второй", pros: "", cons: "", body: "Второй отзыв о камри." },
        ]),
    );
    transport.page(
        &format!("{}?p=2", model_url("toyota", "camry")),
        long_page(&[LongBlock { id: Some("3"), title: "Третий", pros: "", cons: "", body: "Третий отзыв." }]),
    );
    transport.page(
        &model_url("toyota", "corolla"),
        long_page(&[LongBlock { id: Some("4"), title: "Королла", pros: "", cons: "", body: "Отзыв о королле." }]),
    );
    // rav4 has no route and answers 404

    let session = orchestrator
        .run_review_crawl(&CrawlScope::brand("toyota"), ReviewVariant::Long, limits(2))
        .await
        .unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.records_found, 4);
    assert_eq!(session.records_saved, 4);
    assert!(session.records_saved <= session.records_found);

    // The page cap stops camry before a third request
    assert_eq!(transport.calls_to(&format!("{}?p=3", model_url("toyota", "camry"))), 0);

    let repository = orchestrator.repository();
    let camry = repository.find_model("toyota", "camry").await.unwrap().unwrap();
    let corolla = repository.find_model("toyota", "corolla").await.unwrap().unwrap();
    let rav4 = repository.find_model("toyota", "rav4").await.unwrap().unwrap();
    assert_eq!(camry.long_review_count, 3);
    assert_eq!(corolla.long_review_count, 1);
    assert_eq!(rav4.long_review_count, 0);

    let brand = repository.find_brand("toyota").await.unwrap().unwrap();
    assert_eq!(brand.review_count, 4);

    let stats = orchestrator.get_statistics().await.unwrap();
    assert_eq!(stats.total_reviews, 4);
    assert_eq!(stats.long_reviews, 4);
    assert_eq!(stats.top_brands.first(), Some(&("toyota".to_string(), 4)));
}

#[tokio::test]
async fn review_cap_truncates_a_listing() {
    let dir = TempDir::new().unwrap();
    let config = fast_config(dir.path());
    let transport = RoutedTransport::new();
    transport.page(
        &model_url("kia", "rio"),
        long_page(&[
            LongBlock { id: Some("10"), title: "А", pros: "", cons: "", body: "Первый." },
            LongBlock { id: Some("11"), title: "Б", pros: "", cons: "", body: "Второй." },
            LongBlock { id: Some("12"), title: "В", pros: "", cons: "", body: "Третий." },
        ]),
    );

    let orchestrator = orchestrator(&config, transport.clone(), CancellationToken::new()).await.unwrap();
    seed_model(orchestrator.repository(), "kia", "rio").await.unwrap();

    let session = orchestrator
        .run_review_crawl(
            &CrawlScope::model("kia", "rio"),
            ReviewVariant::Long,
            CrawlLimits { max_pages: 3, max_reviews_per_model: 2 },
        )
        .await
        .unwrap();
    assert_eq!(session.records_found, 2);
    assert_eq!(session.records_saved, 2);
    assert_eq!(transport.calls_to(&format!("{}?p=2", model_url("kia", "rio"))), 0);
}

#[tokio::test]
async fn crawl_without_catalog_fails_the_session() {
    let dir = TempDir::new().unwrap();
    let config = fast_config(dir.path());
    let orchestrator = orchestrator(&config, RoutedTransport::new(), CancellationToken::new()).await.unwrap();

    let session = orchestrator
        .run_review_crawl(&CrawlScope::all(), ReviewVariant::Long, limits(1))
        .await
        .unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
    assert!(session.error_message.is_some());
}

#[tokio::test]
async fn comments_are_fetched_until_the_stored_review_is_complete() {
    let dir = TempDir::new().unwrap();
    let mut config = fast_config(dir.path());
    config.crawl.fetch_comments = true;
    let transport = RoutedTransport::new();
    let url = model_url("mazda", "cx5");
    transport.page(
        &url,
        long_page(&[
            LongBlock { id: Some("77"), title: "Подробно", pros: "Динамика", cons: "Расход", body: LONG_BODY },
            LongBlock { id: Some("78"), title: "Кратко", pros: "", cons: "", body: "Нормально." },
        ]),
    );
    transport.page(&format!("{url}?p=2"), empty_page());
    transport.page(
        &format!("{url}77/"),
        comments_page(&[("Олег", "Спасибо за подробности"), ("Анна", "А как с ржавчиной?")]),
    );

    let orchestrator = orchestrator(&config, transport.clone(), CancellationToken::new()).await.unwrap();
    seed_model(orchestrator.repository(), "mazda", "cx5").await.unwrap();
    let scope = CrawlScope::model("mazda", "cx5");

    let first = orchestrator.run_review_crawl(&scope, ReviewVariant::Long, limits(5)).await.unwrap();
    assert_eq!(first.status, SessionStatus::Completed);
    assert_eq!(first.records_saved, 2);
    assert_eq!(first.errors, 0);

    let stored = orchestrator.repository().list_reviews("mazda", "cx5").await.unwrap();
    let detailed = stored.iter().find(|review| review.external_id.as_deref() == Some("77")).unwrap();
    assert_eq!(detailed.comments.len(), 2);
    assert_eq!(detailed.comments[0].author.as_deref(), Some("Олег"));
    assert_eq!(detailed.comments[1].body, "А как с ржавчиной?");
    assert_eq!(detailed.comments[1].likes, 2);
    let brief = stored.iter().find(|review| review.external_id.as_deref() == Some("78")).unwrap();
    assert!(brief.comments.is_empty());

    let second = orchestrator.run_review_crawl(&scope, ReviewVariant::Long, limits(5)).await.unwrap();
    assert_eq!(second.status, SessionStatus::Completed);
    assert_eq!(second.records_saved, 0);

    // The complete review is not requested again; the incomplete one is
    assert_eq!(transport.calls_to(&format!("{url}77/")), 1);
    assert_eq!(transport.calls_to(&format!("{url}78/")), 2);
    assert_eq!(orchestrator.repository().statistics().await.unwrap().total_comments, 2);
}

#[tokio::test]
async fn review_pages_are_not_requested_when_comment_fetching_is_off() {
    let dir = TempDir::new().unwrap();
    let config = fast_config(dir.path());
    let transport = RoutedTransport::new();
    let url = model_url("mazda", "cx5");
    transport.page(&url, long_page(&[LongBlock { id: Some("77"), title: "Подробно", pros: "", cons: "", body: LONG_BODY }]));
    transport.page(&format!("{url}?p=2"), empty_page());
    transport.page(&format!("{url}77/"), comments_page(&[("Олег", "Спасибо")]));

    let orchestrator = orchestrator(&config, transport.clone(), CancellationToken::new()).await.unwrap();
    seed_model(orchestrator.repository(), "mazda", "cx5").await.unwrap();
    orchestrator
        .run_review_crawl(&CrawlScope::model("mazda", "cx5"), ReviewVariant::Long, limits(5))
        .await
        .unwrap();

    assert_eq!(transport.calls_to(&format!("{url}77/")), 0);
    let stored = orchestrator.repository().list_reviews("mazda", "cx5").await.unwrap();
    assert!(stored[0].comments.is_empty());
}
