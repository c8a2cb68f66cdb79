//! Engram search benchmarks
//!
//! Benchmarks for the fusion and consolidation scoring primitives.
//! Run with: cargo bench -p engram-core

use std::collections::HashMap;

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use engram_core::consolidate::jaccard;
use engram_core::embeddings::{cosine_similarity, Embedder, HashingEmbedder};
use engram_core::search::{fuse, HybridConfig};

fn bench_fuse(c: &mut Criterion) {
    let fts: Vec<(String, f64)> = (0..50)
        .map(|i| (format!("doc-{i}"), 1.0 - i as f64 / 50.0))
        .collect();
    let vector: Vec<(String, f64)> = (0..50)
        .map(|i| (format!("doc-{}", 25 + i), 1.0 - i as f64 / 50.0))
        .collect();

    let now = Utc::now();
    let updated: HashMap<String, Option<chrono::DateTime<Utc>>> = (0..80)
        .map(|i| (format!("doc-{i}"), Some(now)))
        .collect();
    let config = HybridConfig {
        min_score: 0.0,
        ..Default::default()
    };

    c.bench_function("fuse_50x50", |b| {
        b.iter(|| {
            black_box(fuse(&fts, &vector, &updated, now, &config));
        })
    });
}

fn bench_hashing_embedder(c: &mut Criterion) {
    let embedder = HashingEmbedder::new(256);
    let text = "DSGVO Compliance für Healthcare Anbieter: Datenschutz Anforderungen, \
                Auditprozesse und die Integration in bestehende Workflows."
        .repeat(8);

    c.bench_function("hashing_embed_1kb", |b| {
        b.iter(|| {
            black_box(embedder.embed(&text).unwrap());
        })
    });
}

fn bench_cosine(c: &mut Criterion) {
    let embedder = HashingEmbedder::new(256);
    let a = embedder.embed("hybrid retrieval with reciprocal rank fusion").unwrap();
    let b_vec = embedder.embed("vector search over entry embeddings").unwrap();

    c.bench_function("cosine_256d", |b| {
        b.iter(|| {
            black_box(cosine_similarity(&a, &b_vec));
        })
    });
}

fn bench_jaccard(c: &mut Criterion) {
    let left = "we decided to use bun for all new backend services going forward".repeat(4);
    let right = "we decided bun replaces node for backend services across the board".repeat(4);

    c.bench_function("jaccard_session_note", |b| {
        b.iter(|| {
            black_box(jaccard(&left, &right));
        })
    });
}

criterion_group!(
    benches,
    bench_fuse,
    bench_hashing_embedder,
    bench_cosine,
    bench_jaccard
);
criterion_main!(benches);
