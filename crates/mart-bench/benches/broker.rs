//! Broker hot-path benchmarks.
//!
//! Covers the ring at capacity, catch-up resolution on a full ring,
//! and publish fan-out to parked subscribers.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mart_core::catchup::resolve;
use mart_core::{ChannelConfig, Message, Registry, RingBuffer};
use std::sync::Arc;
use std::time::Instant;

fn full_ring(capacity: usize) -> RingBuffer<Arc<Message>> {
    let mut ring = RingBuffer::new(capacity);
    for marker in 1..=capacity as u64 {
        ring.push(Arc::new(Message::new(Bytes::from_static(b"payload"), marker * 10)));
    }
    ring
}

/// Push into a ring that is already full, so every push evicts.
fn bench_ring_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_push_at_capacity");
    group.throughput(Throughput::Elements(1));

    for capacity in [10usize, 1_000, 10_000] {
        let mut ring = full_ring(capacity);
        let message = Arc::new(Message::new(Bytes::from_static(b"payload"), u64::MAX));
        group.bench_with_input(BenchmarkId::from_parameter(capacity), &capacity, |b, _| {
            b.iter(|| black_box(ring.push(Arc::clone(&message))));
        });
    }

    group.finish();
}

/// Resolve markers against a full ring.
fn bench_catch_up(c: &mut Criterion) {
    let mut group = c.benchmark_group("catch_up_full_ring");
    let ring = full_ring(10_000);

    group.bench_function("stale", |b| b.iter(|| resolve(black_box(&ring), black_box(0))));
    group.bench_function("middle", |b| {
        b.iter(|| resolve(black_box(&ring), black_box(50_005)))
    });
    group.bench_function("current", |b| {
        b.iter(|| resolve(black_box(&ring), black_box(100_000)))
    });

    group.finish();
}

/// Publish once to a channel with N parked subscribers and collect every delivery.
fn bench_publish_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish_fanout");
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");

    for parked in [1usize, 10, 100, 1_000] {
        group.throughput(Throughput::Elements(parked as u64));
        group.bench_with_input(BenchmarkId::from_parameter(parked), &parked, |b, &parked| {
            let registry = Registry::new();
            let channel = registry.get_or_create("bench", ChannelConfig::new(64));

            b.iter_custom(|iters| {
                rt.block_on(async {
                    let mut elapsed = std::time::Duration::ZERO;
                    for _ in 0..iters {
                        let mut subs: Vec<_> = (0..parked).map(|_| channel.subscribe(None)).collect();

                        let start = Instant::now();
                        channel
                            .publish(Bytes::from_static(b"payload"))
                            .await
                            .expect("publish");
                        for sub in &mut subs {
                            black_box(sub.try_recv());
                        }
                        elapsed += start.elapsed();
                    }
                    elapsed
                })
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_ring_push, bench_catch_up, bench_publish_fanout);
criterion_main!(benches);
