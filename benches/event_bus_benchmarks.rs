//! Benchmarks for event bus delivery and storage round-trips.
//!
//! Run with: cargo bench

use std::cell::Cell;
use std::rc::Rc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use docintel_core::{Event, EventBus, EventKind, Storage};
use serde_json::json;

/// Builds a bus with `n` counting subscribers on `document:text:updated`.
fn bus_with_subscribers(n: usize) -> (EventBus, Rc<Cell<u64>>) {
    let bus = EventBus::new();
    let hits = Rc::new(Cell::new(0));
    for _ in 0..n {
        let hits = Rc::clone(&hits);
        // Subscriptions stay registered for the bus's lifetime
        let _ = bus.subscribe(EventKind::TextUpdated, move |_| hits.set(hits.get() + 1));
    }
    (bus, hits)
}

/// Benchmarks publish cost against subscriber count.
fn bench_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish");

    for size in [0, 1, 10, 100, 1000].iter() {
        let (bus, hits) = bus_with_subscribers(*size);

        group.bench_with_input(BenchmarkId::new("text_updated", size), size, |b, _| {
            b.iter(|| {
                bus.publish(black_box(Event::TextUpdated {
                    text: String::from("hello"),
                }));
            })
        });

        black_box(hits.get());
    }

    group.finish();
}

/// Benchmarks subscribe followed by dispose.
fn bench_subscribe_dispose(c: &mut Criterion) {
    let (bus, _hits) = bus_with_subscribers(100);

    c.bench_function("subscribe_dispose", |b| {
        b.iter(|| {
            let sub = bus.subscribe(EventKind::TextUpdated, |_| {});
            sub.dispose();
        })
    });
}

/// Benchmarks a save/load pair on the in-memory store.
fn bench_storage_round_trip(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let storage = Storage::in_memory();
    let value = json!({"theme": "dark", "recent": ["a.txt", "b.pdf"], "zoom": 125});

    c.bench_function("storage_round_trip", |b| {
        b.iter(|| {
            runtime.block_on(async {
                storage.save("settings_ui", black_box(&value)).await;
                black_box(storage.load("settings_ui", serde_json::Value::Null).await)
            })
        })
    });
}

criterion_group!(
    benches,
    bench_publish,
    bench_subscribe_dispose,
    bench_storage_round_trip
);
criterion_main!(benches);
