//! Criterion benchmarks for Sift.
//!
//! Covers the hot paths of a search round trip:
//! - Query string compilation of condition trees
//! - Memory backend indexing and search
//! - Lazy result set iteration
//! - Snippet highlighting

use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use sift::highlight::Highlighter;
use sift::prelude::*;
use sift::query::QueryLog;

const WORDS: [&str; 16] = [
    "search", "engine", "query", "document", "field", "term", "phrase", "boolean", "score",
    "index", "filter", "facet", "ranking", "snippet", "backend", "result",
];

/// Generate test documents for benchmarking.
fn generate_test_documents(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            let doc_length = 20 + (i % 40);
            (0..doc_length)
                .map(|j| WORDS[(i * 7 + j * 13) % WORDS.len()])
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

fn setup_connection(count: usize) -> Arc<SearchConnection> {
    let model = ModelType::new("bench", "article");
    let objects: Vec<SourceRef> = generate_test_documents(count)
        .into_iter()
        .enumerate()
        .map(|(i, body)| {
            Record::model(model.clone(), i)
                .with("body", body)
                .with("views", (i % 100) as i64)
                .into_ref()
        })
        .collect();

    let registry = Registry::new();
    registry
        .register(
            SearchIndex::new(model.clone())
                .field("text", SearchField::char().document().model_attr("body"))
                .field("views", SearchField::integer().model_attr("views")),
            Arc::new(MemoryStore::from_objects(objects.clone())),
        )
        .unwrap();

    let connection = SearchConnection::new(
        Arc::new(MemoryBackend::new()),
        Arc::new(registry),
        SiftConfig::default(),
    )
    .with_query_log(Arc::new(QueryLog::new(false)));
    connection.update(&model, &objects).unwrap();
    Arc::new(connection)
}

/// Benchmark condition tree compilation.
fn bench_query_building(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_building");
    let connection = setup_connection(0);
    let sqs = SearchQuerySet::new(connection);

    group.bench_function("build_nested_filters", |b| {
        b.iter(|| {
            let built = sqs
                .filter(SQ::content("search") | SQ::content("engine"))
                .exclude(SQ::new("title", "draft"))
                .filter(SQ::new("views__gte", 10))
                .filter(SQ::new("tag__name__startswith", "ru"));
            black_box(built.query().build_query())
        })
    });

    group.bench_function("auto_query", |b| {
        b.iter(|| {
            let built = sqs.auto_query(black_box("\"full text\" search -vector engine"));
            black_box(built.query().build_query())
        })
    });

    group.finish();
}

/// Benchmark the memory backend.
fn bench_memory_backend(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory_backend");
    group.sample_size(20);
    let connection = setup_connection(1000);
    let sqs = SearchQuerySet::new(Arc::clone(&connection));

    group.bench_function("term_search", |b| {
        b.iter(|| black_box(sqs.filter(SQ::content("snippet")).count()))
    });

    group.bench_function("range_and_sort", |b| {
        b.iter(|| {
            let set = sqs
                .filter(SQ::new("views__range", vec![10, 60]))
                .order_by(&["-views"]);
            black_box(set.best_match())
        })
    });

    group.bench_function("facet_counts", |b| {
        b.iter(|| black_box(sqs.filter(SQ::content("facet")).facet("views").facet_counts()))
    });

    group.finish();
}

/// Benchmark lazy result set iteration.
fn bench_result_iteration(c: &mut Criterion) {
    let mut group = c.benchmark_group("result_iteration");
    group.sample_size(20);
    let connection = setup_connection(500);
    let sqs = SearchQuerySet::new(connection);

    group.throughput(Throughput::Elements(500));
    group.bench_function("iter_all", |b| {
        b.iter(|| black_box(sqs.all().iter().count()))
    });

    group.bench_function("manual_iter_all", |b| {
        b.iter(|| black_box(sqs.all().manual_iter().count()))
    });

    group.bench_function("slice_window", |b| {
        b.iter(|| black_box(sqs.all().slice(100..150).len()))
    });

    group.finish();
}

/// Benchmark snippet highlighting.
fn bench_highlighting(c: &mut Criterion) {
    let mut group = c.benchmark_group("highlighting");
    let documents = generate_test_documents(100);
    let highlighter = Highlighter::new("ranking snippet");

    group.throughput(Throughput::Elements(documents.len() as u64));
    group.bench_function("highlight_batch", |b| {
        b.iter(|| {
            for document in &documents {
                black_box(highlighter.highlight(black_box(document)));
            }
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_query_building,
    bench_memory_backend,
    bench_result_iteration,
    bench_highlighting
);
criterion_main!(benches);
