use std::fs::File;

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use feature_rules::{
    feature::{evaluate_feature, evaluate_feature_details},
    Attributes, Configuration, InMemoryStickyBucketStore, StickyBucketStore,
};

fn attributes(value: serde_json::Value) -> Attributes {
    serde_json::from_value(value).unwrap()
}

fn criterion_benchmark(c: &mut Criterion) {
    let configuration: Configuration =
        serde_json::from_reader(File::open("tests/data/features.json").unwrap()).unwrap();
    let now = Utc::now();

    {
        let mut group = c.benchmark_group("rollout");
        group.throughput(Throughput::Elements(1));
        let attributes = attributes(serde_json::json!({"id": "frank"}));
        group.bench_function("evaluate_feature", |b| {
            b.iter(|| {
                evaluate_feature(
                    black_box(&configuration),
                    black_box("production"),
                    black_box("checkout-button"),
                    black_box(&attributes),
                    black_box(None),
                    black_box(now),
                )
            })
        });
        group.bench_function("evaluate_feature_details", |b| {
            b.iter(|| {
                evaluate_feature_details(
                    black_box(&configuration),
                    black_box("production"),
                    black_box("checkout-button"),
                    black_box(&attributes),
                    black_box(None),
                    black_box(now),
                )
            })
        });
        group.finish();
    }

    {
        let mut group = c.benchmark_group("targeting");
        group.throughput(Throughput::Elements(1));
        let attributes = attributes(serde_json::json!({
            "id": "carol",
            "email": "carol@example.com",
            "country": "FR",
        }));
        for feature_key in ["onboarding-flow", "dashboard-export"] {
            group.bench_function(feature_key, |b| {
                b.iter(|| {
                    evaluate_feature(
                        black_box(&configuration),
                        black_box("production"),
                        black_box(feature_key),
                        black_box(&attributes),
                        black_box(None),
                        black_box(now),
                    )
                })
            });
        }
        group.finish();
    }

    {
        let mut group = c.benchmark_group("experiment");
        group.throughput(Throughput::Elements(1));
        let attributes = attributes(serde_json::json!({"id": "bob"}));
        group.bench_function("evaluate_feature", |b| {
            b.iter(|| {
                evaluate_feature(
                    black_box(&configuration),
                    black_box("production"),
                    black_box("search-algorithm"),
                    black_box(&attributes),
                    black_box(None),
                    black_box(now),
                )
            })
        });
        let store = InMemoryStickyBucketStore::new();
        group.bench_function("evaluate_feature_sticky", |b| {
            b.iter(|| {
                evaluate_feature(
                    black_box(&configuration),
                    black_box("production"),
                    black_box("search-algorithm"),
                    black_box(&attributes),
                    black_box(Some(&store as &dyn StickyBucketStore)),
                    black_box(now),
                )
            })
        });
        group.finish();
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
