//! Benchmarks for duration reconciliation.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use postflow::reconcile::{classify, shorten_script, split_sentences, target_words, Thresholds};

const SCRIPT: &str = "Stop scrolling for this. The harbor wakes up before sunrise. \
    Fishing boats slip out one by one while the gulls circle overhead. \
    Nets are checked twice, engines coughed awake, coffee poured into dented mugs. \
    By six the first catch is already on ice at the market. \
    The light turns gold over the water. Follow for the full story!";

fn classify_benchmark(c: &mut Criterion) {
    let thresholds = Thresholds::default();
    c.bench_function("classify", |b| {
        b.iter(|| {
            for audio in [7.5, 8.6, 10.2, 14.0] {
                black_box(classify(black_box(audio), black_box(8.0), &thresholds));
            }
        })
    });
}

fn script_benchmark(c: &mut Criterion) {
    let budget = target_words(12.0, 2.5);
    c.bench_function("split_sentences", |b| b.iter(|| split_sentences(black_box(SCRIPT))));
    c.bench_function("shorten_script", |b| {
        b.iter(|| shorten_script(black_box(SCRIPT), black_box(budget)))
    });
}

criterion_group!(benches, classify_benchmark, script_benchmark);
criterion_main!(benches);
