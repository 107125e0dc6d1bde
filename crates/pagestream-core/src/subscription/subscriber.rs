//! Consumer callbacks: the [`Subscriber`] trait.
//!
//! A subscriber is owned by its subscription's delivery task, which calls it
//! one notification at a time. Callbacks therefore take `&mut self` and never
//! overlap, even though page fetches complete on arbitrary runtime threads.
//!
//! # Ordering
//!
//! 1. `on_subscribe` exactly once, first.
//! 2. Zero or more `on_next`, never more than the total requested.
//! 3. At most one of `on_error` / `on_complete`, last. Cancellation ends the
//!    sequence without a terminal signal.
//!
//! # Panic Safety
//!
//! Panics raised by any callback are caught at the delivery boundary and
//! logged; they never reach the driver or the cursor.

use crate::subscription::error::StreamError;
use crate::subscription::handle::Subscription;

/// Callback trait for cursor subscriptions.
///
/// # Example
///
/// ```rust,ignore
/// struct Collect {
///     rows: Vec<Row>,
/// }
///
/// impl Subscriber<Row, QueryError> for Collect {
///     fn on_subscribe(&mut self, subscription: Subscription) {
///         subscription.request(i64::MAX);
///     }
///
///     fn on_next(&mut self, row: Row) {
///         self.rows.push(row);
///     }
/// }
/// ```
pub trait Subscriber<T, E: std::fmt::Display>: Send + 'static {
    /// Called once, before any other callback.
    ///
    /// The first `request(n)` is typically issued from here.
    fn on_subscribe(&mut self, subscription: Subscription);

    /// Called for each delivered item.
    fn on_next(&mut self, item: T);

    /// Called when the subscription fails. Terminal.
    ///
    /// Default implementation logs the error via `tracing::warn!`.
    fn on_error(&mut self, error: StreamError<E>) {
        tracing::warn!("cursor subscription error: {}", error);
    }

    /// Called once the cursor is exhausted and fully delivered. Terminal.
    ///
    /// Default implementation is a no-op.
    fn on_complete(&mut self) {}
}

// ---------------------------------------------------------------------------
// FnSubscriber
// ---------------------------------------------------------------------------

/// Adapter that wraps a closure into an unbounded-demand [`Subscriber`].
pub(crate) struct FnSubscriber<F>(pub(crate) F);

impl<T, E, F> Subscriber<T, E> for FnSubscriber<F>
where
    F: FnMut(T) + Send + 'static,
    E: std::fmt::Display,
{
    fn on_subscribe(&mut self, subscription: Subscription) {
        subscription.request(i64::MAX);
    }

    fn on_next(&mut self, item: T) {
        (self.0)(item);
    }
}
