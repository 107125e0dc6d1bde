//! Page-fetch orchestration: the per-subscription driver task.
//!
//! The driver owns the cursor and the [`DemandAccountant`]. It:
//!
//! 1. **Resolves** the cursor future, accepting demand in the meantime.
//! 2. **Drains** buffered items against pending demand into the [`Notifier`].
//! 3. **Fetches** one page when demand remains and the buffer is empty.
//! 4. **Waits** for the next of: cancellation, fetch completion, new demand.
//!
//! ```text
//!              request(n)                    fetch_more()
//! Subscription ──mpsc──►  ┌──────────┐  ────────────────►  Cursor
//!                         │  driver  │  ◄── completion ──
//! cancel() ───watch────►  └────┬─────┘
//!                              │ Notifier
//!                              ▼
//!                        delivery task
//! ```
//!
//! A fetch still running when the driver stops is detached onto the runtime
//! and its outcome discarded.

use std::ops::ControlFlow;
use std::sync::Arc;

use futures::future::OptionFuture;
use tokio::sync::{mpsc, watch};

use crate::cursor::{CursorFuture, FetchFuture, PagedCursor};
use crate::subscription::config::SubscriptionConfig;
use crate::subscription::demand::{DemandAccountant, DrainStep, NonPositiveDemand};
use crate::subscription::error::StreamError;
use crate::subscription::handle::{cancelled, Shared};
use crate::subscription::notifier::Notifier;

pub(crate) struct Driver<C: PagedCursor> {
    shared: Arc<Shared>,
    config: SubscriptionConfig,
    demand: DemandAccountant,
    signals: mpsc::UnboundedReceiver<i64>,
    /// `false` once every `Subscription` clone has been dropped.
    signals_open: bool,
    notifier: Notifier<C::Item, C::Error>,
    cancellation: watch::Receiver<bool>,
}

impl<C: PagedCursor> Driver<C> {
    pub(crate) fn new(
        shared: Arc<Shared>,
        config: SubscriptionConfig,
        signals: mpsc::UnboundedReceiver<i64>,
        notifier: Notifier<C::Item, C::Error>,
    ) -> Self {
        let cancellation = shared.cancellation();
        Self {
            shared,
            config,
            demand: DemandAccountant::new(),
            signals,
            signals_open: true,
            notifier,
            cancellation,
        }
    }

    /// Runs the subscription to completion, error or cancellation.
    pub(crate) async fn run(mut self, cursor: CursorFuture<C>) {
        let Some(mut cursor) = self.resolve(cursor).await else {
            return;
        };
        tracing::debug!(
            subscription = %self.shared.id(),
            available = cursor.available_without_fetching(),
            exhausted = cursor.is_exhausted(),
            "cursor resolved"
        );

        let mut in_flight: Option<FetchFuture<C::Error>> = None;
        self.pump(&mut cursor, &mut in_flight).await;

        if let Some(fetch) = in_flight.take() {
            self.detach(fetch);
        }
    }

    /// Waits for the cursor while accumulating demand.
    async fn resolve(&mut self, mut future: CursorFuture<C>) -> Option<C> {
        loop {
            tokio::select! {
                biased;
                () = cancelled(&mut self.cancellation) => return None,
                signal = self.signals.recv(), if self.signals_open => {
                    if self.on_signal(signal).await.is_break() {
                        return None;
                    }
                }
                result = &mut future => {
                    return match result {
                        Ok(cursor) => Some(cursor),
                        Err(e) => {
                            self.demand.close();
                            // Delivery may already be gone; nothing left to notify.
                            let _ = self.notifier.error(StreamError::Query(e)).await;
                            None
                        }
                    };
                }
            }
        }
    }

    async fn pump(&mut self, cursor: &mut C, in_flight: &mut Option<FetchFuture<C::Error>>) {
        loop {
            if self.drain(cursor, in_flight).await.is_break() {
                return;
            }
            if in_flight.is_none() && !self.signals_open {
                tracing::debug!(
                    subscription = %self.shared.id(),
                    "all subscription handles dropped, stopping"
                );
                return;
            }

            tokio::select! {
                biased;
                () = cancelled(&mut self.cancellation) => return,
                Some(result) = OptionFuture::from(in_flight.as_mut()), if in_flight.is_some() => {
                    *in_flight = None;
                    self.demand.finish_fetch();
                    if let Err(e) = result {
                        self.demand.close();
                        let _ = self.notifier.error(StreamError::Fetch(e)).await;
                        return;
                    }
                    tracing::trace!(
                        subscription = %self.shared.id(),
                        available = cursor.available_without_fetching(),
                        "page merged"
                    );
                }
                signal = self.signals.recv(), if self.signals_open => {
                    if self.on_signal(signal).await.is_break() {
                        return;
                    }
                }
            }
        }
    }

    /// One drain cycle: deliver while demand and buffer allow, then decide
    /// between completing, fetching and idling.
    async fn drain(
        &mut self,
        cursor: &mut C,
        in_flight: &mut Option<FetchFuture<C::Error>>,
    ) -> ControlFlow<()> {
        loop {
            if self.shared.is_cancelled() {
                return ControlFlow::Break(());
            }

            let step = self
                .demand
                .next_step(cursor.available_without_fetching(), cursor.is_exhausted());
            match step {
                DrainStep::Deliver => {
                    let Some(item) = cursor.next() else {
                        self.demand.close();
                        let _ = self
                            .notifier
                            .error(StreamError::Internal(
                                "cursor reported buffered items but returned none".into(),
                            ))
                            .await;
                        return ControlFlow::Break(());
                    };
                    self.demand.try_consume();
                    if self.notifier.next(item).await.is_err() {
                        return ControlFlow::Break(());
                    }
                }
                DrainStep::Complete => {
                    self.demand.close();
                    let _ = self.notifier.complete().await;
                    return ControlFlow::Break(());
                }
                DrainStep::Fetch => {
                    if self.demand.begin_fetch() {
                        self.shared.record_fetch();
                        tracing::trace!(
                            subscription = %self.shared.id(),
                            pending = self.demand.pending(),
                            "fetching next page"
                        );
                        *in_flight = Some(cursor.fetch_more());
                    }
                    return ControlFlow::Continue(());
                }
                DrainStep::AwaitFetch | DrainStep::Idle => return ControlFlow::Continue(()),
            }
        }
    }

    async fn on_signal(&mut self, signal: Option<i64>) -> ControlFlow<()> {
        match signal {
            Some(n) => match self.demand.add_demand(n) {
                Ok(()) => {
                    tracing::trace!(
                        subscription = %self.shared.id(),
                        requested = n,
                        pending = self.demand.pending(),
                        "demand added"
                    );
                    ControlFlow::Continue(())
                }
                Err(NonPositiveDemand(n)) => {
                    self.demand.close();
                    let _ = self.notifier.error(StreamError::NonPositiveRequest(n)).await;
                    ControlFlow::Break(())
                }
            },
            None => {
                self.signals_open = false;
                ControlFlow::Continue(())
            }
        }
    }

    /// Lets an abandoned fetch finish in the background.
    fn detach(&self, fetch: FetchFuture<C::Error>) {
        let id = self.shared.id();
        tracing::debug!(subscription = %id, "detaching in-flight fetch");
        drop(self.config.spawn(async move {
            if let Err(e) = fetch.await {
                tracing::debug!(subscription = %id, error = %e, "discarded failed fetch");
            }
        }));
    }
}

// ===========================================================================
// Tests
// ===========================================================================
