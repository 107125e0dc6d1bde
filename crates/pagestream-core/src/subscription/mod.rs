//! # Cursor Subscriptions
//!
//! Turns a paginated, future-returning cursor into a demand-driven,
//! single-subscriber stream.
//!
//! ## Architecture
//!
//! Each subscription runs as two tasks on the configured runtime:
//!
//! - **Driver**: owns the cursor and the demand accountant; drains buffered
//!   items against demand and keeps at most one page fetch in flight
//! - **Delivery**: owns the [`Subscriber`]; invokes its callbacks one at a
//!   time, in order, and stops after the first terminal signal
//!
//! The [`Subscription`] handle feeds demand to the driver over a channel and
//! broadcasts cancellation to both tasks.
//!
//! ## Types
//!
//! - [`CursorPublisher`] - lazy single-subscriber publisher over a cursor future
//! - [`Subscription`] - `request(n)` / `cancel()` handle
//! - [`Subscriber`] - consumer callback trait
//! - [`CursorStream`] - async `Stream` adapter with prefetch
//! - [`StreamError`] - terminal errors delivered to `on_error`

mod config;
mod demand;
mod driver;
mod error;
mod handle;
mod notifier;
mod publisher;
mod stream;
mod subscriber;

pub use config::{
    StreamConfig, SubscriptionConfig, DEFAULT_DELIVERY_BUFFER, DEFAULT_PREFETCH,
    MAX_DELIVERY_BUFFER, MIN_DELIVERY_BUFFER,
};
pub use error::StreamError;
pub use handle::{Subscription, SubscriptionId, SubscriptionMetrics, SubscriptionState};
pub use publisher::CursorPublisher;
pub use stream::CursorStream;
pub use subscriber::Subscriber;
