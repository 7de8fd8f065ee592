//! Benchmarks for frame decoding

use bar_stream::feed::decode;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bar_frame(count: usize) -> String {
    let records: Vec<String> = (0..count)
        .map(|i| {
            format!(
                r#"{{"T":"b","S":"SYM{i}","o":100.25,"h":101.5,"l":99.75,"c":100.5,"v":{},"t":"2025-01-01T00:00:00Z","n":42,"vw":100.3}}"#,
                1000 + i
            )
        })
        .collect();
    format!("[{}]", records.join(","))
}

fn benchmark_single_bar(c: &mut Criterion) {
    let frame = bar_frame(1);

    c.bench_function("decode_single_bar", |b| b.iter(|| decode(black_box(&frame))));
}

fn benchmark_bar_batch(c: &mut Criterion) {
    let frame = bar_frame(100);

    c.bench_function("decode_bar_batch_100", |b| {
        b.iter(|| decode(black_box(&frame)))
    });
}

fn benchmark_mixed_frame(c: &mut Criterion) {
    let single = bar_frame(1);
    let bar = single.trim_start_matches('[').trim_end_matches(']');
    let frame = format!(
        r#"[{bar},{{"T":"q","S":"AAPL","bp":100.1}},{{"T":"t","S":"AAPL","p":100.2}},{{"T":"b","S":"AAPL","o":100}}]"#
    );

    c.bench_function("decode_mixed_frame", |b| b.iter(|| decode(black_box(&frame))));
}

criterion_group!(
    benches,
    benchmark_single_bar,
    benchmark_bar_batch,
    benchmark_mixed_frame
);
criterion_main!(benches);
