//! Performance benchmarks for progressive operations
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pdf_progressive::document::{Color, Document, Page};
use pdf_progressive::ops::{ReflowOptions, RenderOptions, SearchIndex, SearchOptions};
use pdf_progressive::progress::{run_to_completion, PauseEvery};
use pdf_progressive::{Library, LibraryConfig};
use std::sync::Arc;

fn text_document(pages: usize) -> Arc<Document> {
    let pages = (0..pages)
        .map(|n| {
            let mut page = Page::new(612.0, 792.0);
            for line in 0..40 {
                let y = 740.0 - line as f32 * 14.0;
                page.push_text(
                    &format!("page {} line {} of the quarterly shipping report", n, line),
                    72.0,
                    y,
                    10.0,
                );
            }
            page
        })
        .collect();
    Arc::new(Document::new(pages))
}

fn shapes_document(objects: usize) -> Arc<Document> {
    let mut page = Page::new(612.0, 792.0);
    for i in 0..objects {
        let x = (i * 37 % 560) as f32;
        let y = 792.0 - (i * 53 % 740) as f32;
        page.push_rect(x, y, 48.0, 32.0, Color::rgba(200, (i % 255) as u8, 40, 160));
    }
    Arc::new(Document::new(vec![page]))
}

/// Benchmark a full render with and without pauses
fn bench_render(c: &mut Criterion) {
    let doc = shapes_document(500);
    let library = Library::default();
    let options = RenderOptions::default();

    let mut group = c.benchmark_group("render");
    group.throughput(Throughput::Elements(500));

    group.bench_function("unpaused", |b| {
        b.iter(|| {
            let handle = library
                .start_render(black_box(doc.clone()), 1, &options, None)
                .unwrap();
            run_to_completion(&handle);
        });
    });

    group.bench_function("paused_every_step", |b| {
        b.iter(|| {
            let handle = library
                .start_render(
                    black_box(doc.clone()),
                    1,
                    &options,
                    Some(Arc::new(PauseEvery::new(1))),
                )
                .unwrap();
            run_to_completion(&handle);
        });
    });

    group.finish();
}

/// Benchmark the overhead of increment size on reflow
fn bench_reflow_granularity(c: &mut Criterion) {
    let doc = text_document(20);

    let mut group = c.benchmark_group("reflow_granularity");
    for pages_per_step in [1usize, 5, 20] {
        let library = Library::new(LibraryConfig {
            reflow_pages_per_step: pages_per_step,
            ..LibraryConfig::default()
        });
        group.bench_with_input(
            BenchmarkId::from_parameter(pages_per_step),
            &pages_per_step,
            |b, _| {
                b.iter(|| {
                    let handle = library
                        .start_reflow(
                            black_box(doc.clone()),
                            None,
                            ReflowOptions::default(),
                            Some(Arc::new(PauseEvery::new(1))),
                        )
                        .unwrap();
                    run_to_completion(&handle);
                });
            },
        );
    }
    group.finish();
}

/// Benchmark phrase search over an indexed document
fn bench_search(c: &mut Criterion) {
    let library = Library::default();
    let index = SearchIndex::shared();
    let handle = library
        .start_index(&index, text_document(50), "report", None)
        .unwrap();
    run_to_completion(&handle);

    let options = SearchOptions::default();
    c.bench_function("search_phrase", |b| {
        b.iter(|| {
            let hits = index
                .read()
                .search(black_box("quarterly shipping"), &options);
            black_box(hits);
        });
    });
}

criterion_group!(benches, bench_render, bench_reflow_granularity, bench_search);
criterion_main!(benches);
