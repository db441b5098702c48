//! Benchmarks for field location and in-place edits on large configuration files.
//!
//! Run with: cargo bench --bench patching

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use modbuilder::patching::{ConfigDocument, FieldLocator, scan_records};
use std::hint::black_box;

/// Build a file of `records` top-level trader records, each with a nested block
fn build_document(records: usize) -> String {
    let mut text = String::with_capacity(records * 160);
    for i in 0..records {
        text.push_str(&format!(
            "Trader_{i}_TradePrototype : struct.begin {{refkey=[0]}}\n\
             \x20  WeaponSellMinDurability = 0.7\n\
             \x20  ArmorSellMinDurability = 0.7f\n\
             \x20  Limits : struct.begin\n\
             \x20     Threshold = {i}.f\n\
             \x20  struct.end\n\
             struct.end\n"
        ));
    }
    text
}

fn bench_scan_records(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan_records");

    for records in [100, 1_000, 10_000] {
        let text = build_document(records);
        group.bench_with_input(BenchmarkId::from_parameter(records), &text, |b, text| {
            b.iter(|| black_box(scan_records(black_box(text)).len()));
        });
    }

    group.finish();
}

fn bench_set_field(c: &mut Criterion) {
    let mut group = c.benchmark_group("set_field");
    let document = FieldLocator::document("WeaponSellMinDurability");
    let top_level = FieldLocator::in_top_level_records(
        "ArmorSellMinDurability",
        Some("refkey=[0]"),
        &["Trader_0_TradePrototype"],
    );

    for records in [100, 1_000, 10_000] {
        let text = build_document(records);

        group.bench_with_input(BenchmarkId::new("document", records), &text, |b, text| {
            b.iter(|| {
                let mut doc = ConfigDocument::new(text.clone());
                black_box(doc.set_field(&document, black_box(0.25)))
            });
        });

        group.bench_with_input(BenchmarkId::new("top_level", records), &text, |b, text| {
            b.iter(|| {
                let mut doc = ConfigDocument::new(text.clone());
                black_box(doc.set_field(&top_level, black_box(0.25)))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_scan_records, bench_set_field);
criterion_main!(benches);
