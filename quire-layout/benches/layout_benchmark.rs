use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use quire_core::{CharId, ReplicaId, RichText};
use quire_layout::{caret_position, flow, selection_rects, GlyphTable, LayoutConfig, Selection};
use std::hint::black_box;

fn document(paragraphs: usize) -> RichText {
    let mut doc = RichText::new(ReplicaId::from_u128(1));
    let paragraph = "Lorem ipsum dolor sit amet, consectetur adipiscing elit. ".repeat(6) + "\n";
    doc.insert_str(CharId::BASE, &paragraph.repeat(paragraphs), &[])
        .unwrap();
    doc
}

fn metrics() -> GlyphTable {
    GlyphTable::new(2048, 1100).with_advance(quire_core::FontStyle::Regular, ' ', 520)
}

/// Benchmark: full reflow of N paragraphs
fn bench_flow(c: &mut Criterion) {
    let mut group = c.benchmark_group("flow");
    let config = LayoutConfig::default();
    let metrics = metrics();

    for paragraphs in [10, 100] {
        let doc = document(paragraphs);
        group.bench_with_input(BenchmarkId::from_parameter(paragraphs), &doc, |b, doc| {
            b.iter(|| black_box(flow(doc, &config, &metrics)))
        });
    }

    group.finish();
}

/// Benchmark: caret for the last character and select-all geometry
fn bench_geometry(c: &mut Criterion) {
    let config = LayoutConfig::default();
    let metrics = metrics();
    let doc = document(100);
    let lines = flow(&doc, &config, &metrics);
    let last = doc.visible_chars().last().map(|c| c.id).unwrap();

    c.bench_function("caret_position_last_char", |b| {
        b.iter(|| caret_position(&doc, &lines, black_box(last), false, &config, &metrics).unwrap())
    });

    c.bench_function("selection_rects_all", |b| {
        b.iter(|| selection_rects(&doc, &lines, black_box(&Selection::all()), &config, &metrics).unwrap())
    });
}

criterion_group!(benches, bench_flow, bench_geometry);
criterion_main!(benches);
