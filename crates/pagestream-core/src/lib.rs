//! # `pagestream` Core
//!
//! Demand-driven streaming over paginated, fetch-on-demand result cursors.
//!
//! This crate turns a future of a [`PagedCursor`] into a single-subscriber,
//! backpressure-respecting stream:
//! - **Publisher**: [`CursorPublisher`] defers all work until a consumer
//!   subscribes and the cursor resolves
//! - **Subscription**: [`Subscription`] carries `request(n)` / `cancel()`
//! - **Demand accounting**: never delivers beyond requested demand, never has
//!   more than one page fetch in flight
//! - **Serialized delivery**: callbacks run one at a time, in order, on a
//!   dedicated task, never inline in the producer
//!
//! ## Design Principles
//!
//! 1. **One owner per concern** - the driver task owns the cursor, the
//!    delivery task owns the subscriber
//! 2. **Message passing, not shared locks** - demand, notifications and
//!    cancellation travel over channels
//! 3. **Exactly one terminal signal** - `on_error` or `on_complete`, always last
//!
//! ## Example
//!
//! ```rust,ignore
//! use pagestream_core::{CursorPublisher, MemoryCursor, StreamConfig};
//! use tokio_stream::StreamExt;
//!
//! let cursor = MemoryCursor::paged((0..1000).collect(), 100);
//! let mut rows = CursorPublisher::from_cursor(cursor).into_stream(StreamConfig::default());
//!
//! while let Some(row) = rows.next().await {
//!     println!("{}", row?);
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cursor;
pub mod subscription;

// Re-export key types
pub use cursor::{
    CursorFuture, CursorStats, FetchFuture, MemoryCursor, MemoryCursorError, PagedCursor,
};
pub use subscription::{
    CursorPublisher, CursorStream, StreamConfig, StreamError, Subscriber, Subscription,
    SubscriptionConfig, SubscriptionId, SubscriptionMetrics, SubscriptionState,
};
