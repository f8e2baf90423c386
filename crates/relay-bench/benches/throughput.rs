//! Throughput benchmarks for Relay.
//!
//! These benchmarks measure room fan-out and command handling without any
//! network I/O.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use relay_core::Gateway;
use relay_protocol::Address;
use relay_transport::{ConnectionId, DeliveryReceiver, Hub, RoomAdapter};
use serde_json::json;
use std::sync::Arc;

/// Register `count` connections and join them all to `room`.
fn populate(hub: &Hub, room: &str, count: usize) -> Vec<DeliveryReceiver> {
    (0..count)
        .map(|i| {
            let conn = ConnectionId::new(format!("conn-{}", i));
            let rx = hub.register(&conn);
            hub.join(&conn, room).unwrap();
            rx
        })
        .collect()
}

/// Benchmark room fan-out at different audience sizes.
fn bench_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("fanout");
    let address = Address::new("room", "tick");

    for subscribers in [1usize, 100, 1000] {
        let hub = Hub::new();
        let mut receivers = populate(&hub, "room", subscribers);

        group.throughput(Throughput::Elements(subscribers as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, _| {
                b.iter(|| {
                    hub.broadcast_to_room("room", black_box(&address), json!({"n": 1}))
                        .unwrap();
                    // Keep the queues from growing across iterations
                    for rx in &mut receivers {
                        while rx.try_recv().is_ok() {}
                    }
                });
            },
        );
    }

    group.finish();
}

/// Benchmark room membership churn.
fn bench_membership(c: &mut Criterion) {
    let mut group = c.benchmark_group("membership");

    group.bench_function("join_leave", |b| {
        let hub = Hub::new();
        let conn = ConnectionId::new("conn-1");
        let _rx = hub.register(&conn);
        let mut i = 0u64;
        b.iter(|| {
            let room = format!("room-{}", i % 64);
            i += 1;
            hub.join(&conn, &room).unwrap();
            hub.leave(&conn, &room).unwrap();
        });
    });

    group.finish();
}

/// Benchmark end-to-end command handling through the gateway.
fn bench_gateway(c: &mut Criterion) {
    let mut group = c.benchmark_group("gateway");

    group.bench_function("subscribe", |b| {
        let hub = Arc::new(Hub::new());
        let gateway = Gateway::new(hub.clone());
        let conn = ConnectionId::new("conn-1");
        let _rx = hub.register(&conn);
        let payload = json!({"channels": ["a", "b", "c"]});

        b.iter(|| gateway.handle(&conn, "subscribe", black_box(payload.clone())));
    });

    group.bench_function("broadcast_100_sub", |b| {
        let hub = Arc::new(Hub::new());
        let gateway = Gateway::new(hub.clone());
        let mut receivers = populate(&hub, "room", 100);
        let origin = ConnectionId::new("conn-0");
        let payload = json!({"channels": "room::tick", "payload": {"n": 1}});

        b.iter(|| {
            gateway.handle(&origin, "broadcast", black_box(payload.clone()));
            for rx in &mut receivers {
                while rx.try_recv().is_ok() {}
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_fanout, bench_membership, bench_gateway);
criterion_main!(benches);
