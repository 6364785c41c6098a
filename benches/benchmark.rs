// Fit and query benchmarks over a synthetic complaint corpus
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;
use rand::rngs::StdRng;
use semdex::pipeline;
use semdex::prelude::*;
use std::sync::Arc;

const TOPICS: [&[&str]; 4] = [
    &["noise", "loud", "music", "party", "talking", "night", "banging", "neighbor"],
    &["parking", "illegal", "blocked", "hydrant", "driveway", "double", "parked", "car"],
    &["heat", "water", "leak", "boiler", "radiator", "building", "apartment", "cold"],
    &["street", "pothole", "light", "sidewalk", "broken", "condition", "signal", "sign"],
];

fn generate_corpus(size: usize, seed: u64) -> Vec<Document> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..size)
        .map(|i| {
            let topic = TOPICS[rng.random_range(0..TOPICS.len())];
            let words: Vec<&str> = (0..rng.random_range(3..9))
                .map(|_| topic[rng.random_range(0..topic.len())])
                .collect();
            Document::new(i as u64, words.join(" "))
        })
        .collect()
}

fn bench_config() -> PipelineConfig {
    PipelineConfig {
        num_components: 16,
        num_clusters: 4,
        num_init: 3,
        ..Default::default()
    }
}

fn benchmark_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("fit");
    group.sample_size(10);

    for size in [1_000, 10_000].iter() {
        let corpus = generate_corpus(*size, 7);
        group.bench_with_input(BenchmarkId::new("pipeline", size), size, |b, _| {
            b.iter(|| {
                let state = pipeline::fit(black_box(corpus.clone()), &bench_config()).unwrap();
                black_box(state);
            });
        });
    }

    group.finish();
}

fn benchmark_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search");

    let state = pipeline::fit(generate_corpus(20_000, 11), &bench_config()).unwrap();

    group.bench_function("similarity_search_top10", |b| {
        b.iter(|| {
            let hits = state
                .similarity_search(black_box("loud music party at night"), 10)
                .unwrap();
            black_box(hits);
        });
    });

    group.bench_function("predict_cluster", |b| {
        b.iter(|| {
            let cluster = state.predict_cluster(black_box("blocked hydrant")).unwrap();
            black_box(cluster);
        });
    });

    group.finish();
}

fn benchmark_concurrent_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_reads");

    let handle = Arc::new(ModelHandle::with_state(
        pipeline::fit(generate_corpus(5_000, 13), &bench_config()).unwrap(),
    ));

    group.bench_function("snapshot_search_x10", |b| {
        b.iter(|| {
            use std::thread;
            let handles: Vec<_> = (0..10)
                .map(|_| {
                    let handle = handle.clone();
                    thread::spawn(move || {
                        let state = handle.current().unwrap();
                        state.similarity_search("water leak", 10).unwrap()
                    })
                })
                .collect();

            for handle in handles {
                black_box(handle.join().unwrap());
            }
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_fit, benchmark_search, benchmark_concurrent_reads);
criterion_main!(benches);
