use criterion::{criterion_group, criterion_main, Criterion};
use kielo::lexer;
use std::hint::black_box;

static INPUT: &str = include_str!("../../demos/primes.klo");

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("lexer", |b| {
        b.iter(|| {
            let tokens = lexer::lex(black_box(INPUT)).unwrap();
            black_box(tokens.len());
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
