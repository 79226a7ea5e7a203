//! Criterion benchmarks for config flattening
//!
//! Flattening runs on every facade call, so these measure wide documents,
//! deep nesting and label rendering.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::{json, Map, Value};

use kontainer_bridge::cluster::{driver_options, flatten, ClusterSpec};
use kontainer_bridge::options::OptionBag;

// =============================================================================
// Test Fixtures
// =============================================================================

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// `width` mixed leaves at the top level
fn wide_document(width: usize) -> Map<String, Value> {
    let mut doc = Map::new();
    for i in 0..width {
        let value = match i % 4 {
            0 => json!(format!("value-{i}")),
            1 => json!(i),
            2 => json!(i % 2 == 0),
            _ => json!(["a", "b", "c"]),
        };
        doc.insert(format!("key{i}"), value);
    }
    doc
}

/// A single leaf wrapped in `depth` nested objects
fn deep_document(depth: usize) -> Map<String, Value> {
    let mut value = json!({"leaf": "bottom"});
    for i in 0..depth {
        value = json!({ format!("level{i}"): value, format!("sibling{i}"): i });
    }
    object(value)
}

fn labelled_document(labels: usize) -> Map<String, Value> {
    let labels: Map<String, Value> = (0..labels)
        .map(|i| (format!("label{i}"), json!(format!("v{i}"))))
        .collect();
    object(json!({"driverName": "gke", "labels": labels}))
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_wide(c: &mut Criterion) {
    let mut group = c.benchmark_group("flatten_wide");
    for width in [10, 100, 1000] {
        let doc = wide_document(width);
        group.throughput(Throughput::Elements(width as u64));
        group.bench_with_input(BenchmarkId::from_parameter(width), &doc, |b, doc| {
            b.iter(|| {
                let mut bag = OptionBag::new();
                flatten(black_box(doc), &mut bag);
                bag
            })
        });
    }
    group.finish();
}

fn bench_deep(c: &mut Criterion) {
    let mut group = c.benchmark_group("flatten_deep");
    for depth in [4, 16, 64] {
        let doc = deep_document(depth);
        group.bench_with_input(BenchmarkId::from_parameter(depth), &doc, |b, doc| {
            b.iter(|| {
                let mut bag = OptionBag::new();
                flatten(black_box(doc), &mut bag);
                bag
            })
        });
    }
    group.finish();
}

fn bench_driver_options(c: &mut Criterion) {
    let spec = ClusterSpec::generic("prod", labelled_document(50));
    c.bench_function("driver_options_labels_50", |b| {
        b.iter(|| driver_options(black_box("c1"), black_box(&spec)))
    });
}

criterion_group!(benches, bench_wide, bench_deep, bench_driver_options);
criterion_main!(benches);
