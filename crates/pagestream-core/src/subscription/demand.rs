//! Demand accounting for cursor subscriptions.
//!
//! Implements the Reactive Streams `request(n)` model on top of a paginated
//! cursor: the subscriber's requests accumulate as pending demand, and after
//! every delivery or fetch completion the driver asks the accountant what to
//! do next (see [`DrainStep`]).
//!
//! # Ownership
//!
//! The accountant is owned by the subscription's driver task and is never
//! shared. Demand signals reach it over a channel, so the pending counter and
//! the fetch-in-flight flag need no atomics: "at most one fetch in flight"
//! holds because only [`begin_fetch`](DemandAccountant::begin_fetch) sets the
//! flag and only [`finish_fetch`](DemandAccountant::finish_fetch) clears it.

/// The next action of a drain cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DrainStep {
    /// Pop one buffered item and deliver it.
    Deliver,
    /// Demand remains but the cursor is drained and exhausted.
    Complete,
    /// Demand remains, the buffer is empty and no fetch is running.
    Fetch,
    /// Demand remains but a fetch is already running.
    AwaitFetch,
    /// No demand, or the accountant is closed.
    Idle,
}

/// Rejected `request(n)` with `n <= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NonPositiveDemand(pub i64);

/// Tracks outstanding demand and the fetch-in-flight token for one cursor.
#[derive(Debug, Default)]
pub(crate) struct DemandAccountant {
    /// Requested items not yet delivered. Saturates at `u64::MAX`.
    pending: u64,
    /// Set while a `fetch_more` future is outstanding.
    fetch_in_flight: bool,
    /// Set by cancellation or termination; no further steps are produced.
    closed: bool,
}

impl DemandAccountant {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Adds `n` to pending demand.
    ///
    /// Fails for `n <= 0`; pending demand is left unchanged in that case.
    pub(crate) fn add_demand(&mut self, n: i64) -> Result<(), NonPositiveDemand> {
        let n = u64::try_from(n)
            .ok()
            .filter(|n| *n > 0)
            .ok_or(NonPositiveDemand(n))?;
        self.pending = self.pending.saturating_add(n);
        Ok(())
    }

    /// Consumes one unit of demand.
    ///
    /// Returns `false` if there was none.
    pub(crate) fn try_consume(&mut self) -> bool {
        if self.pending == 0 {
            return false;
        }
        self.pending -= 1;
        true
    }

    /// Decides the next drain action given the cursor's current state.
    ///
    /// An outstanding fetch is awaited before completion is decided; a cursor
    /// may report exhaustion while its last page is still loading.
    pub(crate) fn next_step(&self, available: usize, exhausted: bool) -> DrainStep {
        if self.closed || self.pending == 0 {
            DrainStep::Idle
        } else if available > 0 {
            DrainStep::Deliver
        } else if self.fetch_in_flight {
            DrainStep::AwaitFetch
        } else if exhausted {
            DrainStep::Complete
        } else {
            DrainStep::Fetch
        }
    }

    /// Takes the fetch-in-flight token.
    ///
    /// Returns `false` if a fetch is already outstanding or the accountant is
    /// closed, in which case no fetch may be issued.
    pub(crate) fn begin_fetch(&mut self) -> bool {
        if self.fetch_in_flight || self.closed {
            return false;
        }
        self.fetch_in_flight = true;
        true
    }

    /// Releases the fetch-in-flight token after the fetch completed.
    pub(crate) fn finish_fetch(&mut self) {
        self.fetch_in_flight = false;
    }

    /// Stops producing drain steps.
    pub(crate) fn close(&mut self) {
        self.closed = true;
    }

    pub(crate) fn pending(&self) -> u64 {
        self.pending
    }

    #[cfg(test)]
    pub(crate) fn is_fetch_in_flight(&self) -> bool {
        self.fetch_in_flight
    }

    #[cfg(test)]
    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }
}

// ===========================================================================
// Tests
// ===========================================================================
