//! Performance benchmarks for search and the reference embedder.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use cortex::embedding::{Embedder, TfIdfEmbedder};
use cortex::search::search as hybrid_search;
use cortex::storage::queries;
use cortex::storage::Storage;
use cortex::types::{CreateMemoryInput, SearchOptions};

fn setup_storage_with_data(count: usize) -> Storage {
    let storage = Storage::open_in_memory().unwrap();

    let sample_contents = [
        "Authentication using JWT tokens and refresh mechanism",
        "Database migration strategy for PostgreSQL",
        "React component lifecycle and hooks optimization",
        "API rate limiting implementation with Redis",
        "Docker container orchestration with Kubernetes",
        "GraphQL schema design best practices",
        "Microservices communication patterns",
        "CI/CD pipeline configuration with GitHub Actions",
        "Memory leak detection in Node.js applications",
        "Rust ownership and borrowing concepts",
    ];

    for i in 0..count {
        let content = format!(
            "{} - variation {} with additional context about software development",
            sample_contents[i % sample_contents.len()],
            i
        );

        storage
            .with_connection(|conn| {
                queries::create(
                    conn,
                    &CreateMemoryInput {
                        title: format!("note {i}"),
                        content,
                        tags: vec![format!("topic{}", i % 5), "development".to_string()],
                        importance: Some((i % 10) as f32 / 10.0),
                        project: Some("default".to_string()),
                        ..Default::default()
                    },
                )
            })
            .unwrap();
    }

    storage
}

fn bench_hybrid_search_lexical_only(c: &mut Criterion) {
    let storage = setup_storage_with_data(1000);

    let mut group = c.benchmark_group("hybrid_search_lexical");

    let queries = vec![
        "authentication",
        "database migration",
        "React hooks optimization",
        "API rate limiting Redis",
    ];

    for query in queries {
        group.bench_with_input(BenchmarkId::new("query", query), &query, |b, query| {
            b.iter(|| {
                let options = SearchOptions {
                    query: Some(query.to_string()),
                    project: Some("default".to_string()),
                    limit: Some(10),
                    ..Default::default()
                };
                storage
                    .with_connection(|conn| {
                        futures::executor::block_on(hybrid_search(conn, black_box(&options)))
                    })
                    .unwrap()
            })
        });
    }

    group.finish();
}

fn bench_tfidf_embedding(c: &mut Criterion) {
    let embedder = TfIdfEmbedder::new(384);

    let mut group = c.benchmark_group("tfidf_embedding");

    let texts = vec![
        ("short", "hello world"),
        ("medium", "The quick brown fox jumps over the lazy dog"),
        ("long", "Authentication using JWT tokens requires careful consideration of security best practices including token expiration, refresh token rotation, and secure storage mechanisms"),
    ];

    for (name, text) in texts {
        group.bench_with_input(BenchmarkId::new("text_length", name), &text, |b, text| {
            b.iter(|| embedder.embed(black_box(text)).unwrap())
        });
    }

    let batch: Vec<&str> = (0..100)
        .map(|i| {
            if i % 3 == 0 {
                "Short text"
            } else if i % 3 == 1 {
                "Medium length text with more content"
            } else {
                "Longer text with significantly more content to process and embed into vector space"
            }
        })
        .collect();

    group.bench_function("batch_100", |b| {
        b.iter(|| embedder.embed_batch(black_box(&batch)).unwrap())
    });

    group.finish();
}

fn bench_search_at_scale(c: &mut Criterion) {
    let mut group = c.benchmark_group("search_scale");
    group.sample_size(50);

    for &size in &[100, 1000, 5000] {
        let storage = setup_storage_with_data(size);
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("memories", size), &size, |b, _| {
            b.iter(|| {
                let options = SearchOptions {
                    query: Some("authentication JWT tokens".to_string()),
                    project: Some("default".to_string()),
                    limit: Some(10),
                    ..Default::default()
                };
                storage
                    .with_connection(|conn| {
                        futures::executor::block_on(hybrid_search(conn, black_box(&options)))
                    })
                    .unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_hybrid_search_lexical_only,
    bench_tfidf_embedding,
    bench_search_at_scale,
);

criterion_main!(benches);
