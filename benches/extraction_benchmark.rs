//! Extraction throughput on synthetic listing pages

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use drom_reviews_crawler::domain::{ReviewVariant, content_hash};
use drom_reviews_crawler::infrastructure::{ExtractContext, ReviewExtractor, SelectorConfig};

fn long_page(blocks: usize) -> String {
    let items: String = (0..blocks)
        .map(|i| {
            format!(
                r#"<div data-ftid="review-item" id="{i}">
                    <h3>Отзыв {i}</h3>
                    <div data-ftid="review-content__positive">Надёжность, расход</div>
                    <div data-ftid="review-content__negative">Шумоизоляция</div>
                    <div data-ftid="review-content__general">Эксплуатирую машину третий год, пробег вырос на сорок тысяч. Отзыв номер {i}.</div>
                    <time datetime="2021-03-0{}">март</time>
                </div>"#,
                i % 9 + 1
            )
        })
        .collect();
    format!("<html><body>{items}</body></html>")
}

fn short_page(blocks: usize) -> String {
    let items: String = (0..blocks)
        .map(|i| {
            format!(
                r#"<div data-ftid="short-review-item" id="{i}">
                    <div data-ftid="short-review-item__title">Kia Rio <span data-ftid="short-review-item__year">2015</span> год</div>
                    <div class="css-987tv1"><span>Автор {i}</span><span>01.02.2022</span><span>Казань</span></div>
                    <div data-ftid="short-review-content__positive">Экономичная машина номер {i}</div>
                    <div data-ftid="short-review-content__negative">Слабая подвеска</div>
                </div>"#
            )
        })
        .collect();
    format!("<html><body>{items}</body></html>")
}

fn extraction_benchmark(c: &mut Criterion) {
    let extractor = ReviewExtractor::new(&SelectorConfig::default()).expect("default selectors compile");
    let context = ExtractContext::new("https://www.drom.ru", "kia", "rio");

    let mut group = c.benchmark_group("extract");
    for blocks in [10, 50] {
        let long = long_page(blocks);
        group.bench_with_input(BenchmarkId::new("long", blocks), &long, |b, page| {
            b.iter(|| extractor.extract(black_box(page), ReviewVariant::Long, &context))
        });
        let short = short_page(blocks);
        group.bench_with_input(BenchmarkId::new("short", blocks), &short, |b, page| {
            b.iter(|| extractor.extract(black_box(page), ReviewVariant::Short, &context))
        });
    }
    group.finish();
}

fn content_hash_benchmark(c: &mut Criterion) {
    let body = "Эксплуатирую  машину третий   год. ".repeat(40);
    c.bench_function("content_hash", |b| {
        b.iter(|| content_hash(black_box(Some("Отзыв")), Some("Надёжность"), Some("Шумоизоляция"), black_box(&body)))
    });
}

criterion_group!(benches, extraction_benchmark, content_hash_benchmark);
criterion_main!(benches);
