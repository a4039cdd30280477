//! # Cruncher Benchmarks
//!
//! Performance benchmarks for rumstat-core loading and reports.
//!
//! Run with: `cargo bench -p rumstat-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rumstat_core::query::{ReportKind, ReportOptions, run_report};
use rumstat_core::{Bundle, Cruncher, Event, calculate_confidence};
use std::hint::black_box;

/// Create N bundles spread over 50 URLs with a handful of events each.
fn create_bundles(size: usize) -> Vec<Bundle> {
    (0..size)
        .map(|i| {
            let variant = if i % 2 == 0 { "control" } else { "challenger" };
            Bundle::new(format!("https://example.com/page-{}", i % 50), 100.0)
                .with_user_agent(if i % 3 == 0 { "mobile:ios" } else { "desktop:windows" })
                .with_events([
                    Event::new("experiment").with_source("hero").with_target(variant),
                    Event::new("click").with_source(format!(".block-{}", i % 7)),
                    Event::new("cwv-lcp").with_value((i % 4000) as f64),
                ])
        })
        .collect()
}

fn registered_engine() -> Cruncher {
    let mut engine = Cruncher::new();
    engine
        .add_facet("url", |b: &Bundle| Some(b.url.clone()))
        .expect("facet");
    engine
        .add_facet("source", |b: &Bundle| {
            b.events
                .iter()
                .filter_map(|e| e.source.clone())
                .collect::<Vec<_>>()
        })
        .expect("facet");
    engine
        .add_series("views", |b: &Bundle| b.weight)
        .expect("series");
    engine
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("load");

    for size in [1_000, 10_000, 100_000].iter() {
        let bundles = create_bundles(*size);

        group.bench_with_input(BenchmarkId::from_parameter(size), &bundles, |b, bundles| {
            b.iter(|| {
                let mut engine = registered_engine();
                engine.load(bundles.iter().cloned());
                black_box(engine.facet("url").len())
            });
        });
    }

    group.finish();
}

fn bench_reports(c: &mut Criterion) {
    let mut group = c.benchmark_group("report");
    let bundles = create_bundles(10_000);
    let options = ReportOptions::default();

    for kind in ReportKind::ALL {
        group.bench_with_input(BenchmarkId::from_parameter(kind), &kind, |b, &kind| {
            b.iter(|| black_box(run_report(kind, bundles.iter().cloned(), &options)));
        });
    }

    group.finish();
}

fn bench_confidence(c: &mut Criterion) {
    c.bench_function("calculate_confidence", |b| {
        b.iter(|| {
            black_box(calculate_confidence(
                black_box(120.0),
                black_box(1000.0),
                black_box(150.0),
                black_box(1000.0),
            ))
        });
    });
}

criterion_group!(benches, bench_load, bench_reports, bench_confidence);
criterion_main!(benches);
