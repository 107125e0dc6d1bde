//! Paginated result cursors.
//!
//! A [`PagedCursor`] is the only thing the subscription engine needs from the
//! query-execution layer: a buffer of already-fetched items plus a way to ask
//! for the next page. The engine never touches the buffer from more than one
//! task at a time; only the future returned by [`PagedCursor::fetch_more`]
//! may run elsewhere.
//!
//! [`MemoryCursor`] is an in-memory implementation with configurable pages,
//! fetch latency and failure injection.

mod memory;

pub use memory::{CursorStats, MemoryCursor, MemoryCursorError};

use futures::future::BoxFuture;

/// Future returned by [`PagedCursor::fetch_more`].
///
/// Resolves once the next page has been merged into the cursor's buffer (or
/// the cursor has become exhausted).
pub type FetchFuture<E> = BoxFuture<'static, Result<(), E>>;

/// Future that resolves to a cursor once the initial query has executed.
pub type CursorFuture<C> = BoxFuture<'static, Result<C, <C as PagedCursor>::Error>>;

/// A stateful, paginated handle over a sequence of result items.
///
/// # Contract
///
/// `available_without_fetching`, `is_exhausted` and `next` are only ever
/// called by the single task that currently owns delivery for the cursor.
/// The future returned by `fetch_more` is independent of the `&mut self`
/// borrow and may complete on any runtime thread; implementations must make
/// the buffer merge it performs safe with respect to those calls.
pub trait PagedCursor: Send + 'static {
    /// Item produced by the cursor (typically a row).
    type Item: Send + 'static;
    /// Error surfaced by a failed page fetch or query execution.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Number of items retrievable right now without any I/O.
    fn available_without_fetching(&self) -> usize;

    /// Returns `true` once no further pages exist.
    fn is_exhausted(&self) -> bool;

    /// Pops one buffered item.
    ///
    /// Returns `None` if no item is currently available.
    fn next(&mut self) -> Option<Self::Item>;

    /// Asynchronously requests the next page.
    ///
    /// The engine guarantees at most one outstanding call per cursor.
    fn fetch_more(&mut self) -> FetchFuture<Self::Error>;
}
