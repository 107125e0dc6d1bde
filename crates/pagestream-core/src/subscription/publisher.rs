//! Cursor publisher: bridges a future of a cursor into one subscription.
//!
//! [`CursorPublisher`] holds the not-yet-polled cursor future. The first
//! [`subscribe`](CursorPublisher::subscribe) takes it and wires two tasks:
//!
//! - a **driver** that resolves the future and serves demand from the cursor
//! - a **delivery** task that owns the subscriber and invokes its callbacks
//!
//! Nothing runs before that first subscribe. The cursor is not shareable, so
//! any later subscriber is rejected with
//! [`StreamError::AlreadySubscribed`] without affecting the first.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::cursor::{CursorFuture, PagedCursor};
use crate::subscription::config::{StreamConfig, SubscriptionConfig};
use crate::subscription::driver::Driver;
use crate::subscription::error::StreamError;
use crate::subscription::handle::{Shared, Subscription};
use crate::subscription::notifier::{deliver, Notification, Notifier};
use crate::subscription::stream::CursorStream;
use crate::subscription::subscriber::{FnSubscriber, Subscriber};

/// Single-subscriber publisher over a paginated cursor.
///
/// ```rust,ignore
/// let publisher = CursorPublisher::new(session.execute_paged(query));
/// publisher.subscribe(MySubscriber::default());
/// ```
pub struct CursorPublisher<C: PagedCursor> {
    config: SubscriptionConfig,
    /// Taken by the first subscriber.
    cursor: Mutex<Option<CursorFuture<C>>>,
}

impl<C: PagedCursor> CursorPublisher<C> {
    /// Creates a publisher over a future that resolves to a cursor.
    pub fn new<F>(cursor: F) -> Self
    where
        F: Future<Output = Result<C, C::Error>> + Send + 'static,
    {
        Self::with_config(cursor, SubscriptionConfig::default())
    }

    /// Creates a publisher with a custom subscription configuration.
    pub fn with_config<F>(cursor: F, config: SubscriptionConfig) -> Self
    where
        F: Future<Output = Result<C, C::Error>> + Send + 'static,
    {
        Self {
            config,
            cursor: Mutex::new(Some(Box::pin(cursor))),
        }
    }

    /// Creates a publisher over an already-resolved cursor.
    pub fn from_cursor(cursor: C) -> Self {
        Self::new(futures::future::ready(Ok(cursor)))
    }

    /// Returns the subscription configuration.
    #[must_use]
    pub fn config(&self) -> &SubscriptionConfig {
        &self.config
    }

    /// Returns `true` once a subscriber has been accepted.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.cursor.lock().is_none()
    }

    /// Subscribes `subscriber` to the cursor.
    ///
    /// The subscriber always receives `on_subscribe` first. A second
    /// subscriber then receives `on_error(AlreadySubscribed)`; it never
    /// sees any item.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime and no runtime handle is
    /// configured.
    pub fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<C::Item, C::Error>,
    {
        let cursor = self.cursor.lock().take();

        let shared = Shared::new(self.config.name.clone());
        let (demand_tx, demand_rx) = mpsc::unbounded_channel();
        let (mut notifier, queue) = Notifier::channel(self.config.effective_delivery_buffer());
        let subscription = Subscription::new(Arc::clone(&shared), demand_tx);

        let Some(cursor) = cursor else {
            tracing::warn!(
                subscription = %shared.id(),
                name = %self.config.name,
                "rejecting second subscriber"
            );
            drop(demand_rx);
            notifier.try_enqueue(Notification::Error(StreamError::AlreadySubscribed));
            drop(notifier);
            self.config.spawn(deliver(subscriber, subscription, queue, shared));
            return;
        };

        tracing::debug!(
            subscription = %shared.id(),
            name = %self.config.name,
            "subscribed"
        );
        self.config.spawn(deliver(
            subscriber,
            subscription,
            queue,
            Arc::clone(&shared),
        ));
        let driver = Driver::<C>::new(shared, self.config.clone(), demand_rx, notifier);
        self.config.spawn(driver.run(cursor));
    }

    /// Subscribes a closure that receives every item.
    ///
    /// Requests unbounded demand; errors are logged and completion is
    /// silent. Equivalent to [`subscribe`](Self::subscribe) with an internal
    /// adapter.
    pub fn subscribe_fn<F>(&self, f: F)
    where
        F: FnMut(C::Item) + Send + 'static,
    {
        self.subscribe(FnSubscriber(f));
    }

    /// Converts the publisher into an async [`Stream`](tokio_stream::Stream).
    ///
    /// Fails in-stream with [`StreamError::AlreadySubscribed`] if the
    /// publisher was already subscribed.
    pub fn into_stream(self, config: StreamConfig) -> CursorStream<C::Item, C::Error> {
        CursorStream::subscribe(&self, config)
    }
}

impl<C: PagedCursor> std::fmt::Debug for CursorPublisher<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CursorPublisher")
            .field("name", &self.config.name)
            .field("subscribed", &self.is_subscribed())
            .finish_non_exhaustive()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
