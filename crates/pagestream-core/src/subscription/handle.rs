//! Subscription handle, the consumer-facing side of a cursor subscription.
//!
//! A [`Subscription`] is handed to [`Subscriber::on_subscribe`] and carries
//! the two consumer signals of the protocol: `request(n)` and `cancel()`.
//! It is cheap to clone and may be used from any thread, including from
//! inside the subscriber's own callbacks.
//!
//! # Lifecycle
//!
//! ```text
//! Active ──cancel()──────────────► Cancelled
//!    │
//!    └──on_error / on_complete───► Terminated
//! ```
//!
//! Neither `Cancelled` nor `Terminated` can be left. Calls made after either
//! are silent no-ops.
//!
//! [`Subscriber::on_subscribe`]: super::Subscriber::on_subscribe

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

// ---------------------------------------------------------------------------
// SubscriptionId
// ---------------------------------------------------------------------------

/// Unique subscription identifier.
///
/// Monotonically assigned per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl SubscriptionId {
    fn next() -> Self {
        Self(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// SubscriptionState
// ---------------------------------------------------------------------------

/// Lifecycle state of a subscription.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Accepting demand and delivering items.
    Active = 0,
    /// Cancelled by the consumer.
    Cancelled = 1,
    /// A terminal signal (`on_error` or `on_complete`) was delivered.
    Terminated = 2,
}

impl SubscriptionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Active,
            1 => Self::Cancelled,
            _ => Self::Terminated,
        }
    }
}

// ---------------------------------------------------------------------------
// SubscriptionMetrics
// ---------------------------------------------------------------------------

/// Point-in-time snapshot of a subscription's counters.
#[derive(Debug, Clone)]
pub struct SubscriptionMetrics {
    /// Subscription ID.
    pub id: SubscriptionId,
    /// Configured name.
    pub name: String,
    /// Current lifecycle state.
    pub state: SubscriptionState,
    /// Items handed to `on_next`.
    pub items_delivered: u64,
    /// Page fetches issued against the cursor.
    pub pages_fetched: u64,
    /// Time since the subscription was created.
    pub age: Duration,
}

// ---------------------------------------------------------------------------
// Shared
// ---------------------------------------------------------------------------

/// State shared by the handle, the driver task and the delivery task.
pub(crate) struct Shared {
    id: SubscriptionId,
    name: String,
    state: AtomicU8,
    cancel: watch::Sender<bool>,
    items_delivered: AtomicU64,
    pages_fetched: AtomicU64,
    created_at: Instant,
}

impl Shared {
    pub(crate) fn new(name: String) -> Arc<Self> {
        let (cancel, _) = watch::channel(false);
        Arc::new(Self {
            id: SubscriptionId::next(),
            name,
            state: AtomicU8::new(SubscriptionState::Active as u8),
            cancel,
            items_delivered: AtomicU64::new(0),
            pages_fetched: AtomicU64::new(0),
            created_at: Instant::now(),
        })
    }

    pub(crate) fn id(&self) -> SubscriptionId {
        self.id
    }

    pub(crate) fn state(&self) -> SubscriptionState {
        SubscriptionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn is_active(&self) -> bool {
        self.state() == SubscriptionState::Active
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.state() == SubscriptionState::Cancelled
    }

    /// Moves `Active` to `to`. Returns `false` if already out of `Active`.
    fn transition(&self, to: SubscriptionState) -> bool {
        self.state
            .compare_exchange(
                SubscriptionState::Active as u8,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Marks the subscription cancelled and wakes both tasks.
    pub(crate) fn cancel(&self) -> bool {
        if !self.transition(SubscriptionState::Cancelled) {
            return false;
        }
        self.cancel.send_replace(true);
        true
    }

    /// Marks the subscription terminated ahead of its terminal callback.
    pub(crate) fn terminate(&self) -> bool {
        self.transition(SubscriptionState::Terminated)
    }

    /// Receiver that observes `true` once the subscription is cancelled.
    pub(crate) fn cancellation(&self) -> watch::Receiver<bool> {
        self.cancel.subscribe()
    }

    pub(crate) fn record_delivery(&self) {
        self.items_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fetch(&self) {
        self.pages_fetched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn metrics(&self) -> SubscriptionMetrics {
        SubscriptionMetrics {
            id: self.id,
            name: self.name.clone(),
            state: self.state(),
            items_delivered: self.items_delivered.load(Ordering::Relaxed),
            pages_fetched: self.pages_fetched.load(Ordering::Relaxed),
            age: self.created_at.elapsed(),
        }
    }
}

/// Resolves when `cancellation` observes `true`.
///
/// Never resolves if the sender is gone without cancelling.
pub(crate) async fn cancelled(cancellation: &mut watch::Receiver<bool>) {
    let outcome = cancellation.wait_for(|cancelled| *cancelled).await.map(drop);
    if outcome.is_err() {
        std::future::pending::<()>().await;
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Handle used by a subscriber to request items or cancel.
///
/// ```rust,ignore
/// impl Subscriber<Row, QueryError> for Printer {
///     fn on_subscribe(&mut self, subscription: Subscription) {
///         subscription.request(10);
///         self.subscription = Some(subscription);
///     }
///
///     fn on_next(&mut self, row: Row) {
///         println!("{row:?}");
///         if let Some(s) = &self.subscription {
///             s.request(1);
///         }
///     }
/// }
/// ```
#[derive(Clone)]
pub struct Subscription {
    shared: Arc<Shared>,
    demand: mpsc::UnboundedSender<i64>,
}

impl Subscription {
    pub(crate) fn new(shared: Arc<Shared>, demand: mpsc::UnboundedSender<i64>) -> Self {
        Self { shared, demand }
    }

    /// Requests `n` more items.
    ///
    /// `n <= 0` is a protocol violation: the subscriber receives
    /// [`StreamError::NonPositiveRequest`](super::StreamError::NonPositiveRequest)
    /// and the subscription terminates. Demand accumulates across calls and
    /// saturates, so `request(i64::MAX)` means "everything".
    pub fn request(&self, n: i64) {
        if !self.shared.is_active() {
            return;
        }
        if n <= 0 {
            tracing::warn!(subscription = %self.shared.id(), n, "non-positive request");
        }
        if self.demand.send(n).is_err() {
            tracing::trace!(subscription = %self.shared.id(), "request after driver exit");
        }
    }

    /// Cancels the subscription.
    ///
    /// Idempotent. When called from inside a subscriber callback, no further
    /// callback is started once this returns. When called from another task,
    /// at most one callback that had already passed its cancellation check
    /// may still run. A page fetch already in flight is allowed to finish and
    /// its result is discarded.
    pub fn cancel(&self) {
        if self.shared.cancel() {
            tracing::debug!(subscription = %self.shared.id(), "subscription cancelled");
        }
    }

    /// Returns the subscription ID.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.shared.id()
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        self.shared.state()
    }

    /// Returns `true` if the subscription has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }

    /// Returns a snapshot of the subscription's counters.
    #[must_use]
    pub fn metrics(&self) -> SubscriptionMetrics {
        self.shared.metrics()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.shared.id())
            .field("state", &self.shared.state())
            .finish()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn make_subscription() -> (Subscription, mpsc::UnboundedReceiver<i64>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Shared::new("SELECT * FROM trades".into());
        (Subscription::new(shared, tx), rx)
    }

    #[test]
    fn test_subscription_id_display_and_uniqueness() {
        let (a, _rx_a) = make_subscription();
        let (b, _rx_b) = make_subscription();
        assert_ne!(a.id(), b.id());
        assert!(b.id() > a.id());
        assert_eq!(SubscriptionId(7).to_string(), "sub-7");
    }

    #[test]
    fn test_request_forwards_demand() {
        let (sub, mut rx) = make_subscription();
        sub.request(3);
        sub.request(0);
        assert_eq!(rx.try_recv().unwrap(), 3);
        assert_eq!(rx.try_recv().unwrap(), 0);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let (sub, _rx) = make_subscription();
        let mut cancellation = sub.shared.cancellation();
        assert_eq!(sub.state(), SubscriptionState::Active);

        sub.cancel();
        sub.cancel();
        assert!(sub.is_cancelled());
        assert!(cancellation.has_changed().unwrap());
        assert!(*cancellation.borrow_and_update());
    }

    #[test]
    fn test_request_after_cancel_is_noop() {
        let (sub, mut rx) = make_subscription();
        sub.cancel();
        sub.request(5);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_terminated_ignores_cancel() {
        let (sub, mut rx) = make_subscription();
        assert!(sub.shared.terminate());
        sub.cancel();
        sub.request(1);
        assert_eq!(sub.state(), SubscriptionState::Terminated);
        assert!(!sub.shared.terminate());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_metrics_snapshot() {
        let (sub, _rx) = make_subscription();
        sub.shared.record_delivery();
        sub.shared.record_delivery();
        sub.shared.record_fetch();

        let m = sub.metrics();
        assert_eq!(m.id, sub.id());
        assert_eq!(m.name, "SELECT * FROM trades");
        assert_eq!(m.state, SubscriptionState::Active);
        assert_eq!(m.items_delivered, 2);
        assert_eq!(m.pages_fetched, 1);
    }

    #[tokio::test]
    async fn test_cancelled_future_resolves_on_cancel() {
        let (sub, _rx) = make_subscription();
        let mut cancellation = sub.shared.cancellation();
        let waiter = tokio::spawn(async move { cancelled(&mut cancellation).await });
        sub.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
