use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

static INPUT: &str = include_str!("../../demos/primes.klo");

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("pipeline", |b| {
        b.iter(|| {
            let asm = kielo::compile(black_box(INPUT)).unwrap();
            black_box(asm.len());
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
