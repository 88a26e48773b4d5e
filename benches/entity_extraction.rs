//! Performance benchmarks for pattern-based entity extraction.

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use cortex::intelligence::entities::extract;

fn bench_entity_extraction(c: &mut Criterion) {
    let text = "Mr. John Smith and Ms. Jane Doe are working at Anthropic on the Claude project. \
                They met yesterday to discuss semantic search, vector databases, and switched \
                the backend to PostgreSQL for durability, running on Kubernetes.";

    let mut group = c.benchmark_group("entity_extraction");
    group.throughput(Throughput::Bytes(text.len() as u64));

    group.bench_function("extract_mixed", |b| b.iter(|| extract(text)));

    group.finish();
}

criterion_group!(benches, bench_entity_extraction);

criterion_main!(benches);
