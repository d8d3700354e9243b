//! Benchmarks for parameter encoding and batch flush.
//!
//! Run with: cargo bench -p weft-runtime

use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};
use serde_json::json;
use std::hint::black_box;
use weft_core::{AttributeDef, ComponentArena, ComponentDef, DefDescriptor, ValueExpr};
use weft_runtime::{ActionBuilder, ActionDef, ActionQueue, Encoder, OfflineTransport, Runtime, RuntimeConfig};

fn source_def() -> ComponentDef {
    ComponentDef::new(DefDescriptor::markup("bench", "source").expect("descriptor"))
        .attribute(AttributeDef::new("label").with_default("hello"))
        .attribute(AttributeDef::new("nested").with_default(json!({ "a": [1, 2, 3] })))
}

fn echo() -> ActionDef {
    ActionDef::new("Bench", "echo").required("value")
}

fn bench_encode_action(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode/action");

    for sites in [1, 8, 64, 256] {
        let mut arena = ComponentArena::new();
        let source = arena.instantiate(source_def().into(), Default::default(), None);
        let items: Vec<ValueExpr> = (0..sites)
            .map(|i| {
                let path = if i % 2 == 0 { "v.label" } else { "v.nested.a.1" };
                arena.reference(source, path).expect("reference").into()
            })
            .collect();
        let mut queue = ActionQueue::new();
        let action = queue
            .create(ActionBuilder::new(echo()).param("value", ValueExpr::list(items)))
            .expect("action");

        group.bench_with_input(BenchmarkId::new("live_sites", sites), &action, |b, action| {
            b.iter(|| black_box(Encoder::new(&arena).encode_action(action)))
        });

        arena.destroy(source);
        group.bench_with_input(BenchmarkId::new("destroyed_sites", sites), &action, |b, action| {
            b.iter(|| black_box(Encoder::new(&arena).encode_action(action)))
        });
    }

    group.finish();
}

fn bench_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode/flush");

    for actions in [1, 16, 128] {
        group.bench_function(BenchmarkId::new("actions", actions), |b| {
            b.iter_batched(
                || {
                    let mut rt = Runtime::new(
                        RuntimeConfig::default().with_flush_at_turn_end(false),
                        OfflineTransport,
                    );
                    let source = rt.instantiate(source_def());
                    for _ in 0..actions {
                        let reference = rt.reference(source, "v.label").expect("reference");
                        rt.enqueue(ActionBuilder::new(echo()).param("value", reference))
                            .expect("enqueue");
                    }
                    rt
                },
                |mut rt| black_box(rt.flush()),
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, bench_encode_action, bench_flush);

criterion_main!(benches);
