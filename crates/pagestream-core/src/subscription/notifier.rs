//! Serialized notification delivery.
//!
//! The driver enqueues [`Notification`]s through a [`Notifier`]; a single
//! delivery task per subscription pops them in order and invokes the
//! [`Subscriber`]. Because the delivery task exclusively owns the subscriber,
//! at most one callback runs at a time and no lock is held across it.
//!
//! ```text
//! driver task ──Notifier──► bounded mpsc ──► delivery task ──► Subscriber
//!   (cursor)                 (in order)       (one at a time)
//! ```
//!
//! Once a terminal notification has been accepted the notifier drops any
//! further enqueues, and the delivery task stops after delivering it.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::subscription::error::StreamError;
use crate::subscription::handle::{cancelled, Shared, Subscription, SubscriptionId};
use crate::subscription::subscriber::Subscriber;

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// One unit of the next-item / error / completion protocol.
#[derive(Debug)]
pub(crate) enum Notification<T, E> {
    /// An item for `on_next`.
    Next(T),
    /// A terminal error for `on_error`.
    Error(StreamError<E>),
    /// Terminal completion for `on_complete`.
    Complete,
}

impl<T, E> Notification<T, E> {
    pub(crate) fn is_terminal(&self) -> bool {
        !matches!(self, Self::Next(_))
    }
}

/// The delivery task is gone (cancelled or finished).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DeliveryClosed;

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// Producer side of the delivery queue.
pub(crate) struct Notifier<T, E> {
    queue: mpsc::Sender<Notification<T, E>>,
    terminated: bool,
}

impl<T, E> Notifier<T, E> {
    /// Creates a notifier and the receiver its delivery task will drain.
    pub(crate) fn channel(capacity: usize) -> (Self, mpsc::Receiver<Notification<T, E>>) {
        let (queue, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                queue,
                terminated: false,
            },
            rx,
        )
    }

    /// Enqueues a notification, waiting for queue capacity.
    ///
    /// Silently drops the notification if a terminal one was already
    /// accepted.
    pub(crate) async fn enqueue(
        &mut self,
        notification: Notification<T, E>,
    ) -> Result<(), DeliveryClosed> {
        if self.terminated {
            return Ok(());
        }
        self.terminated = notification.is_terminal();
        self.queue
            .send(notification)
            .await
            .map_err(|_| DeliveryClosed)
    }

    /// Enqueues without waiting. Returns `false` if the queue is full or
    /// closed, or if the notifier already terminated.
    pub(crate) fn try_enqueue(&mut self, notification: Notification<T, E>) -> bool {
        if self.terminated {
            return false;
        }
        self.terminated = notification.is_terminal();
        self.queue.try_send(notification).is_ok()
    }

    pub(crate) async fn next(&mut self, item: T) -> Result<(), DeliveryClosed> {
        self.enqueue(Notification::Next(item)).await
    }

    pub(crate) async fn error(&mut self, error: StreamError<E>) -> Result<(), DeliveryClosed> {
        self.enqueue(Notification::Error(error)).await
    }

    pub(crate) async fn complete(&mut self) -> Result<(), DeliveryClosed> {
        self.enqueue(Notification::Complete).await
    }

    #[cfg(test)]
    pub(crate) fn is_terminated(&self) -> bool {
        self.terminated
    }
}

// ---------------------------------------------------------------------------
// Delivery task
// ---------------------------------------------------------------------------

/// Delivers queued notifications to `subscriber`, one at a time.
///
/// Calls `on_subscribe` first. Before every later callback the cancelled
/// state is re-checked, so nothing is delivered once `cancel()` returned.
pub(crate) async fn deliver<S, T, E>(
    mut subscriber: S,
    subscription: Subscription,
    mut queue: mpsc::Receiver<Notification<T, E>>,
    shared: Arc<Shared>,
) where
    S: Subscriber<T, E>,
    E: std::fmt::Display,
{
    let id = shared.id();
    let mut cancellation = shared.cancellation();

    guarded(id, "on_subscribe", || subscriber.on_subscribe(subscription));

    loop {
        let notification = tokio::select! {
            biased;
            () = cancelled(&mut cancellation) => break,
            next = queue.recv() => match next {
                Some(notification) => notification,
                None => break,
            },
        };

        if shared.is_cancelled() {
            break;
        }

        match notification {
            Notification::Next(item) => {
                shared.record_delivery();
                guarded(id, "on_next", || subscriber.on_next(item));
            }
            Notification::Error(error) => {
                if shared.terminate() {
                    tracing::debug!(subscription = %id, %error, "subscription failed");
                    guarded(id, "on_error", || subscriber.on_error(error));
                }
                break;
            }
            Notification::Complete => {
                if shared.terminate() {
                    tracing::debug!(subscription = %id, "subscription completed");
                    guarded(id, "on_complete", || subscriber.on_complete());
                }
                break;
            }
        }
    }

    // Undelivered notifications are dropped with the receiver; closing first
    // fails any send the driver is blocked on.
    queue.close();
}

/// Runs one subscriber callback, containing any panic it raises.
fn guarded(id: SubscriptionId, callback: &'static str, f: impl FnOnce()) {
    if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(f)) {
        tracing::error!(
            subscription = %id,
            callback,
            "subscriber panicked: {}",
            panic_message(panic.as_ref())
        );
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
