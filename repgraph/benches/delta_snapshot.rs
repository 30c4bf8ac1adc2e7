use std::hint::black_box;
use std::sync::Arc;

use codec::SnapshotTick;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use repgraph::{ClientId, ReplicationConfig, ReplicationGraph};
use schema::{FieldDef, FieldId, FieldKind, FieldValue, SchemaRegistry};

const ENTITIES: usize = 1000;

fn populated_graph() -> ReplicationGraph {
    let mut registry = SchemaRegistry::new();
    let player = registry.register_class("player").unwrap();
    registry
        .add_field(player, FieldDef::new("origin", FieldKind::Vec3))
        .unwrap();
    registry
        .add_field(player, FieldDef::new("angles", FieldKind::Vec3))
        .unwrap();
    registry
        .add_field(player, FieldDef::new("health", FieldKind::int(16)))
        .unwrap();
    registry
        .add_field(player, FieldDef::new("flags", FieldKind::uint(32)))
        .unwrap();

    let mut graph = ReplicationGraph::new(Arc::new(registry.build()), ReplicationConfig::default());
    for _ in 0..ENTITIES {
        graph.spawn(player).unwrap();
    }
    graph.add_client(ClientId(1));
    graph.snapshot_sent(ClientId(1), codec::SnapshotMode::Full);
    graph.clear_changes();
    graph
}

fn bench_delta(c: &mut Criterion) {
    let mut group = c.benchmark_group("delta_snapshot");
    for percent in [1usize, 10, 50] {
        let mut graph = populated_graph();
        let ids: Vec<_> = graph.iter().map(|(id, _)| id).collect();
        for (i, id) in ids.iter().enumerate().filter(|(i, _)| i % 100 < percent) {
            graph
                .set(*id, FieldId::new(0), FieldValue::Vec3([i as f32, 0.0, 0.0]))
                .unwrap();
        }
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{percent}pct_dirty")),
            &graph,
            |b, graph| {
                b.iter(|| {
                    let snapshot = graph
                        .build_snapshot(ClientId(1), false, SnapshotTick::new(1))
                        .unwrap();
                    black_box(snapshot)
                });
            },
        );
    }
    group.finish();
}

fn bench_full(c: &mut Criterion) {
    let graph = populated_graph();
    c.bench_function("full_snapshot_1000", |b| {
        b.iter(|| {
            let snapshot = graph
                .build_snapshot(ClientId(1), true, SnapshotTick::new(1))
                .unwrap();
            black_box(snapshot)
        });
    });
}

criterion_group!(benches, bench_delta, bench_full);
criterion_main!(benches);
