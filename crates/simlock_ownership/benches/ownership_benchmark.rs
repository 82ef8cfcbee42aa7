//! Benchmark for the lock hot paths.
//!
//! TARGET: a table decision well under a microsecond
//!
//! Run with: cargo bench --package simlock_ownership --bench ownership_benchmark

#![allow(missing_docs)]

use std::time::Instant;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use crossbeam_channel::bounded;
use simlock_ownership::{LockAuthority, LockRequest, OwnershipConfig, OwnershipTable, SimulationOwnership};
use simlock_shared::{ClientId, ClientMessage, EntityId, LockKind, RequestId, ServerMessage};

fn benchmark_table_acquire_release(c: &mut Criterion) {
    let table = OwnershipTable::new();
    let now = Instant::now();
    let entity = EntityId::from_u128(1);

    c.bench_function("table_acquire_release", |b| {
        b.iter(|| {
            black_box(table.try_acquire(black_box(entity), ClientId(1), LockKind::Exclusive, now));
            black_box(table.release(black_box(entity), ClientId(1)));
        });
    });
}

fn benchmark_contended_denial(c: &mut Criterion) {
    let table = OwnershipTable::new();
    let now = Instant::now();
    let entity = EntityId::from_u128(2);
    table.try_acquire(entity, ClientId(1), LockKind::Exclusive, now);

    c.bench_function("table_contended_denial", |b| {
        b.iter(|| black_box(table.try_acquire(black_box(entity), ClientId(2), LockKind::Exclusive, now)));
    });
}

fn benchmark_authority_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("authority_requests");

    for entities in [16u128, 1_024, 65_536] {
        let authority = LockAuthority::new(&OwnershipConfig::default());
        let client = authority.register_client().unwrap_or(ClientId(0));
        let now = Instant::now();

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(entities), &entities, |b, &entities| {
            let mut i = 0u128;
            b.iter(|| {
                i = (i + 1) % entities;
                let entity_id = EntityId::from_u128(i);
                black_box(authority.handle(
                    ClientMessage::LockRequest {
                        request_id: Some(RequestId(0)),
                        entity_id,
                        kind: LockKind::Exclusive,
                        client,
                    },
                    now,
                ));
                authority.handle(ClientMessage::Release { entity_id, client }, now);
            });
        });
    }
    group.finish();
}

fn benchmark_request_round_trip(c: &mut Criterion) {
    let (tx, rx) = bounded(1024);
    let ownership = SimulationOwnership::new(ClientId(1), tx, &OwnershipConfig::default());
    let entity_id = EntityId::from_u128(3);

    c.bench_function("arbiter_request_response", |b| {
        b.iter(|| {
            ownership.request_simulation_lock(LockRequest::new(
                entity_id,
                LockKind::Transient,
                |_, granted, ()| {
                    black_box(granted);
                },
                (),
            ));
            if let Ok(ClientMessage::LockRequest { request_id, .. }) = rx.try_recv() {
                ownership.handle_message(ServerMessage::LockResponse {
                    request_id,
                    entity_id,
                    kind: LockKind::Transient,
                    granted: false,
                });
            }
        });
    });
}

criterion_group!(
    benches,
    benchmark_table_acquire_release,
    benchmark_contended_denial,
    benchmark_authority_throughput,
    benchmark_request_round_trip,
);
criterion_main!(benches);
