//! VWAP walk benchmarks

use arbscan::core::PriceLevel;
use arbscan::depth::vwap;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rust_decimal::Decimal;

fn side(levels: usize) -> Vec<PriceLevel> {
    (0..levels)
        .map(|i| {
            PriceLevel::new(
                Decimal::from(30_000 + i as i64) + Decimal::new(17, 2),
                Decimal::new(5, 1),
            )
        })
        .collect()
}

fn bench_vwap(c: &mut Criterion) {
    let shallow = side(20);
    let deep = side(200);
    let target = Decimal::from(100);
    let deep_target = Decimal::from(2_000_000);

    c.bench_function("vwap_top_of_book", |b| {
        b.iter(|| vwap(black_box(&shallow), black_box(target)))
    });

    c.bench_function("vwap_deep_walk", |b| {
        b.iter(|| vwap(black_box(&deep), black_box(deep_target)))
    });
}

criterion_group!(benches, bench_vwap);
criterion_main!(benches);
