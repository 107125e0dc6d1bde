//! Subscription engine benchmarks
//!
//! Measures end-to-end drain throughput from a `MemoryCursor` to a
//! subscriber, and the async stream adapter on top of it.
//!
//! Run with: cargo bench --bench subscription_bench

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio::sync::oneshot;
use tokio_stream::StreamExt;

use pagestream_core::{
    CursorPublisher, MemoryCursor, MemoryCursorError, StreamConfig, Subscriber, Subscription,
};

const ROWS: u64 = 10_000;

/// Requests everything up front and counts what arrives.
struct Count {
    seen: u64,
    done: Option<oneshot::Sender<u64>>,
}

impl Subscriber<u64, MemoryCursorError> for Count {
    fn on_subscribe(&mut self, subscription: Subscription) {
        subscription.request(i64::MAX);
    }

    fn on_next(&mut self, item: u64) {
        black_box(item);
        self.seen += 1;
    }

    fn on_complete(&mut self) {
        if let Some(done) = self.done.take() {
            let _ = done.send(self.seen);
        }
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

fn bench_subscriber_drain(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("subscriber_drain");
    group.throughput(Throughput::Elements(ROWS));

    for page_size in [100_usize, 1_000, 5_000] {
        group.bench_with_input(
            BenchmarkId::from_parameter(page_size),
            &page_size,
            |b, &page_size| {
                b.iter(|| {
                    rt.block_on(async {
                        let cursor = MemoryCursor::paged((0..ROWS).collect(), page_size);
                        let (tx, rx) = oneshot::channel();
                        CursorPublisher::from_cursor(cursor).subscribe(Count {
                            seen: 0,
                            done: Some(tx),
                        });
                        black_box(rx.await.unwrap())
                    })
                });
            },
        );
    }
    group.finish();
}

fn bench_stream_prefetch(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("stream_prefetch");
    group.throughput(Throughput::Elements(ROWS));

    for prefetch in [16_u32, 256, 4_096] {
        group.bench_with_input(
            BenchmarkId::from_parameter(prefetch),
            &prefetch,
            |b, &prefetch| {
                b.iter(|| {
                    rt.block_on(async {
                        let cursor = MemoryCursor::paged((0..ROWS).collect::<Vec<u64>>(), 1_000);
                        let mut stream = CursorPublisher::from_cursor(cursor)
                            .into_stream(StreamConfig::with_prefetch(prefetch));
                        let mut seen = 0_u64;
                        while let Some(item) = stream.next().await {
                            black_box(item.unwrap());
                            seen += 1;
                        }
                        seen
                    })
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_subscriber_drain, bench_stream_prefetch);
criterion_main!(benches);
