//! Async [`CursorStream`] over a cursor subscription.
//!
//! Wraps the callback protocol in a `tokio_stream`-compatible `Stream`, so
//! paged results can be consumed with `while let` and combinators like
//! `.map()`, `.take()` and `.try_collect()`.
//!
//! # Flow Control
//!
//! The stream requests `prefetch` items as soon as it is subscribed and tops
//! demand back up to `prefetch` whenever outstanding demand falls to half of
//! it. Items are therefore pulled from the cursor a page at a time while the
//! consumer is not more than `prefetch` items behind.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tokio_stream::StreamExt;
//!
//! let mut rows = publisher.into_stream(StreamConfig::with_prefetch(500));
//!
//! while let Some(row) = rows.next().await {
//!     process(row?);
//! }
//! ```
//!
//! Dropping the stream cancels the subscription.

use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::mpsc;
use tokio_stream::Stream;

use crate::cursor::PagedCursor;
use crate::subscription::config::StreamConfig;
use crate::subscription::error::StreamError;
use crate::subscription::handle::{Subscription, SubscriptionId, SubscriptionMetrics};
use crate::subscription::publisher::CursorPublisher;
use crate::subscription::subscriber::Subscriber;

enum StreamSignal<T, E> {
    Subscribed(Subscription),
    Item(T),
    Failed(StreamError<E>),
    Completed,
}

/// Subscriber that forwards every signal to a [`CursorStream`].
struct ChannelSubscriber<T, E> {
    tx: mpsc::UnboundedSender<StreamSignal<T, E>>,
}

impl<T, E> Subscriber<T, E> for ChannelSubscriber<T, E>
where
    T: Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    fn on_subscribe(&mut self, subscription: Subscription) {
        let handle = subscription.clone();
        if self.tx.send(StreamSignal::Subscribed(subscription)).is_err() {
            // Stream dropped before it saw the subscription.
            handle.cancel();
        }
    }

    fn on_next(&mut self, item: T) {
        let _ = self.tx.send(StreamSignal::Item(item));
    }

    fn on_error(&mut self, error: StreamError<E>) {
        let _ = self.tx.send(StreamSignal::Failed(error));
    }

    fn on_complete(&mut self) {
        let _ = self.tx.send(StreamSignal::Completed);
    }
}

// ---------------------------------------------------------------------------
// CursorStream
// ---------------------------------------------------------------------------

/// Async stream of cursor items.
///
/// Implements `Stream<Item = Result<T, StreamError<E>>>`. An error is the
/// last item yielded; completion ends the stream with `None`.
pub struct CursorStream<T, E> {
    /// Signals forwarded by the internal subscriber.
    rx: mpsc::UnboundedReceiver<StreamSignal<T, E>>,
    /// Set once `on_subscribe` has been observed.
    subscription: Option<Subscription>,
    /// Target outstanding demand.
    prefetch: u32,
    /// Requested but not yet received.
    outstanding: u32,
    /// Whether the stream has ended.
    terminated: bool,
}

impl<T, E> CursorStream<T, E>
where
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    pub(crate) fn subscribe<C>(publisher: &CursorPublisher<C>, config: StreamConfig) -> Self
    where
        C: PagedCursor<Item = T, Error = E>,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        publisher.subscribe(ChannelSubscriber { tx });
        Self {
            rx,
            subscription: None,
            prefetch: config.effective_prefetch(),
            outstanding: 0,
            terminated: false,
        }
    }
}

impl<T, E> CursorStream<T, E> {
    /// Returns the subscription ID, once subscribed.
    #[must_use]
    pub fn id(&self) -> Option<SubscriptionId> {
        self.subscription.as_ref().map(Subscription::id)
    }

    /// Returns the subscription's counters, once subscribed.
    #[must_use]
    pub fn metrics(&self) -> Option<SubscriptionMetrics> {
        self.subscription.as_ref().map(Subscription::metrics)
    }

    /// Returns `true` if the stream has ended.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Cancels the subscription and ends the stream.
    ///
    /// Subsequent calls to `poll_next` / `next()` return `None`.
    pub fn cancel(&mut self) {
        self.terminated = true;
        if let Some(subscription) = &self.subscription {
            subscription.cancel();
        }
        self.rx.close();
    }

    fn on_subscribed(&mut self, subscription: Subscription) {
        subscription.request(i64::from(self.prefetch));
        self.outstanding = self.prefetch;
        self.subscription = Some(subscription);
    }

    fn replenish(&mut self) {
        self.outstanding = self.outstanding.saturating_sub(1);
        if self.outstanding > self.prefetch / 2 {
            return;
        }
        if let Some(subscription) = &self.subscription {
            subscription.request(i64::from(self.prefetch - self.outstanding));
            self.outstanding = self.prefetch;
        }
    }
}

impl<T, E> Stream for CursorStream<T, E> {
    type Item = Result<T, StreamError<E>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.terminated {
            return Poll::Ready(None);
        }

        loop {
            match this.rx.poll_recv(cx) {
                Poll::Ready(Some(StreamSignal::Subscribed(subscription))) => {
                    this.on_subscribed(subscription);
                }
                Poll::Ready(Some(StreamSignal::Item(item))) => {
                    this.replenish();
                    return Poll::Ready(Some(Ok(item)));
                }
                Poll::Ready(Some(StreamSignal::Failed(error))) => {
                    this.terminated = true;
                    return Poll::Ready(Some(Err(error)));
                }
                Poll::Ready(Some(StreamSignal::Completed) | None) => {
                    this.terminated = true;
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl<T, E> Drop for CursorStream<T, E> {
    fn drop(&mut self) {
        if let Some(subscription) = &self.subscription {
            subscription.cancel();
        }
    }
}

impl<T, E> std::fmt::Debug for CursorStream<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CursorStream")
            .field("id", &self.id())
            .field("prefetch", &self.prefetch)
            .field("outstanding", &self.outstanding)
            .field("terminated", &self.terminated)
            .finish_non_exhaustive()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
