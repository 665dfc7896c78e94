//! Benchmarks pour le parsing de tables de points

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use pnezd::ParseOptions;

fn synthetic_table(rows: usize) -> String {
    let mut content = String::from("ID,X,Y,Z,Description,Code\n");
    for i in 0..rows {
        content.push_str(&format!(
            "P{},{:.3},{:.3},{:.3},point {},CODE{}\n",
            i,
            157000.0 + (i % 977) as f64 * 0.731,
            6407000.0 + (i % 1409) as f64 * 0.413,
            18.0 + (i % 53) as f64 * 0.07,
            i,
            i % 7
        ));
    }
    content
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");

    for rows in [1_000usize, 10_000, 100_000] {
        let content = synthetic_table(rows);
        group.throughput(Throughput::Bytes(content.len() as u64));

        group.bench_with_input(BenchmarkId::from_parameter(rows), &content, |b, content| {
            b.iter(|| {
                let result =
                    pnezd::parse_str(black_box(content), &ParseOptions::default()).unwrap();
                black_box(result)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parse);
criterion_main!(benches);
