//! Paged stream demo.
//!
//! Streams rows from a simulated remote cursor, first with a batching
//! subscriber and then through the async `Stream` adapter.
//!
//! ```bash
//! RUST_LOG=pagestream_core=trace cargo run -p pagestream-core --example paged_stream
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_stream::StreamExt;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pagestream_core::{
    CursorPublisher, FetchFuture, PagedCursor, StreamConfig, StreamError, Subscriber,
    Subscription, SubscriptionConfig,
};

/// Rows of a fake `trades` table, served page by page with latency.
///
/// Reports exhaustion as soon as the last page has been requested.
struct TradesCursor {
    buffer: Arc<Mutex<VecDeque<String>>>,
    next_row: u32,
    total: u32,
    page_size: u32,
}

impl TradesCursor {
    fn open(total: u32, page_size: u32) -> BoxFuture<'static, Result<Self, std::io::Error>> {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let mut cursor = Self {
                buffer: Arc::new(Mutex::new(VecDeque::new())),
                next_row: 0,
                total,
                page_size,
            };
            let first = cursor.page();
            cursor.buffer.lock().extend(first);
            Ok(cursor)
        })
    }

    fn page(&mut self) -> Vec<String> {
        let end = (self.next_row + self.page_size).min(self.total);
        let rows = (self.next_row..end)
            .map(|i| format!("trade-{i}: {} @ {}", 100 + i % 7, 50 + i % 13))
            .collect();
        self.next_row = end;
        rows
    }
}

impl PagedCursor for TradesCursor {
    type Item = String;
    type Error = std::io::Error;

    fn available_without_fetching(&self) -> usize {
        self.buffer.lock().len()
    }

    fn is_exhausted(&self) -> bool {
        self.next_row >= self.total
    }

    fn next(&mut self) -> Option<String> {
        self.buffer.lock().pop_front()
    }

    fn fetch_more(&mut self) -> FetchFuture<std::io::Error> {
        let rows = self.page();
        let buffer = Arc::clone(&self.buffer);
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            buffer.lock().extend(rows);
            Ok(())
        })
    }
}

/// Requests rows ten at a time and reports when done.
struct BatchPrinter {
    subscription: Option<Subscription>,
    seen: u32,
    done: Option<oneshot::Sender<u32>>,
}

impl Subscriber<String, std::io::Error> for BatchPrinter {
    fn on_subscribe(&mut self, subscription: Subscription) {
        subscription.request(10);
        self.subscription = Some(subscription);
    }

    fn on_next(&mut self, row: String) {
        self.seen += 1;
        if self.seen % 10 == 0 {
            info!(seen = self.seen, last = %row, "batch received");
            if let Some(subscription) = &self.subscription {
                subscription.request(10);
            }
        }
    }

    fn on_error(&mut self, error: StreamError<std::io::Error>) {
        tracing::error!(%error, "stream failed");
        if let Some(done) = self.done.take() {
            let _ = done.send(self.seen);
        }
    }

    fn on_complete(&mut self) {
        if let Some(done) = self.done.take() {
            let _ = done.send(self.seen);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pagestream_core=debug,paged_stream=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Callback style.
    let publisher = CursorPublisher::with_config(
        TradesCursor::open(95, 25),
        SubscriptionConfig::named("SELECT * FROM trades"),
    );
    let (done, finished) = oneshot::channel();
    publisher.subscribe(BatchPrinter {
        subscription: None,
        seen: 0,
        done: Some(done),
    });
    info!(rows = finished.await?, "callback subscriber finished");

    // Stream style.
    let mut rows = CursorPublisher::new(TradesCursor::open(40, 16))
        .into_stream(StreamConfig::with_prefetch(8));
    let mut count = 0;
    while let Some(row) = rows.next().await {
        let row = row?;
        count += 1;
        if count % 10 == 0 {
            info!(count, %row, "streamed");
        }
    }
    info!(count, "stream finished");

    Ok(())
}
