use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::sync::Arc;

use atrium_auth::{AllowAllGate, RequestContext};
use atrium_core::{ResourceId, ResourceKind, StreamId, TenantId, UserId};
use atrium_events::{
    CanvasOp, CommandEnvelope, CommandPayload, Env, EventBody, RoutingKeys, StreamEvent,
    Strictness,
};
use atrium_infra::CommandApplyEngine;
use atrium_infra::isolation::IsolationRegistry;
use atrium_infra::revision::InMemoryRevisionStore;
use atrium_infra::timeline::{FileTimelineStore, InMemoryTimelineStore, TimelineStore};
use serde_json::json;
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn ctx() -> RequestContext {
    RequestContext::new(TenantId::new("t_bench").unwrap(), UserId::new("u1").unwrap())
}

fn command(canvas_id: &ResourceId, base_rev: u64, ops: usize) -> CommandEnvelope {
    CommandEnvelope {
        command_id: format!("cmd-{base_rev}"),
        canvas_id: canvas_id.clone(),
        base_rev,
        idempotency_key: Some(format!("k-{base_rev}")),
        payload: CommandPayload::ApplyOps {
            ops: (0..ops)
                .map(|i| CanvasOp::AddNode {
                    node_id: format!("n{base_rev}-{i}"),
                    props: json!({"x": i, "y": base_rev}),
                })
                .collect(),
        },
        routing: RoutingKeys::new(TenantId::new("t_bench").unwrap(), Env::Dev),
    }
}

fn engine(rt: &Runtime, canvas_id: &ResourceId) -> CommandApplyEngine {
    let registry = IsolationRegistry::in_memory();
    rt.block_on(registry.register(&ctx().tenant_id, canvas_id, ResourceKind::Canvas))
        .unwrap();
    CommandApplyEngine::new(
        registry,
        Arc::new(AllowAllGate),
        Arc::new(InMemoryRevisionStore::new()),
        Arc::new(InMemoryTimelineStore::new()),
    )
}

fn bench_apply_latency(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("apply_latency");

    for ops in [1usize, 10, 100] {
        group.throughput(Throughput::Elements(ops as u64));
        group.bench_with_input(BenchmarkId::new("applied", ops), &ops, |b, &ops| {
            let canvas_id = ResourceId::new("c-bench").unwrap();
            let engine = engine(&rt, &canvas_id);
            let ctx = ctx();
            let mut head = 0u64;
            b.iter(|| {
                let r = rt.block_on(engine.apply(&ctx, command(&canvas_id, head, ops))).unwrap();
                head = r.current_rev;
                black_box(r);
            });
        });
    }

    group.bench_function("idempotent_replay", |b| {
        let canvas_id = ResourceId::new("c-bench").unwrap();
        let engine = engine(&rt, &canvas_id);
        let ctx = ctx();
        rt.block_on(engine.apply(&ctx, command(&canvas_id, 0, 1))).unwrap();
        b.iter(|| black_box(rt.block_on(engine.apply(&ctx, command(&canvas_id, 0, 1))).unwrap()));
    });

    group.bench_function("conflict_with_100_recovery_ops", |b| {
        let canvas_id = ResourceId::new("c-bench").unwrap();
        let engine = engine(&rt, &canvas_id);
        let ctx = ctx();
        for base in 0..100 {
            rt.block_on(engine.apply(&ctx, command(&canvas_id, base, 1))).unwrap();
        }
        b.iter(|| black_box(rt.block_on(engine.apply(&ctx, command(&canvas_id, 0, 1))).unwrap()));
    });

    group.finish();
}

fn bench_replay(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("timeline_replay");
    let stream_id = StreamId::new("canvas:c-bench").unwrap();
    let ctx = ctx();

    let events: Vec<StreamEvent> = (0..1000)
        .map(|n| {
            StreamEvent::builder(ctx.routing_keys(), EventBody::opaque("bench.tick", json!({"n": n})))
                .build(Strictness::Lenient)
                .unwrap()
        })
        .collect();
    let cursor = events[899].event_id().clone();

    let memory = InMemoryTimelineStore::new();
    let dir = tempfile::tempdir().unwrap();
    let file = rt.block_on(FileTimelineStore::open(dir.path())).unwrap();
    for event in &events {
        rt.block_on(memory.append(&stream_id, event, &ctx)).unwrap();
        rt.block_on(file.append(&stream_id, event, &ctx)).unwrap();
    }

    let stores: [(&str, &dyn TimelineStore); 2] = [("memory", &memory), ("fs", &file)];
    for (name, store) in stores {
        group.throughput(Throughput::Elements(100));
        group.bench_function(BenchmarkId::new("list_after_last_100", name), |b| {
            b.iter(|| black_box(rt.block_on(store.list_after(&stream_id, Some(&cursor))).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_apply_latency, bench_replay);
criterion_main!(benches);
