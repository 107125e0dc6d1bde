//! In-memory paginated cursor.
//!
//! Serves pre-built pages, one per [`fetch_more`](PagedCursor::fetch_more)
//! call. The first page is buffered at construction, mirroring a query whose
//! first page arrives with the execution result. Fetches can be delayed or
//! made to fail, and [`CursorStats`] records how the engine drove the cursor.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::cursor::{FetchFuture, PagedCursor};

/// Error produced by a [`MemoryCursor`] fetch configured to fail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct MemoryCursorError(pub String);

// ---------------------------------------------------------------------------
// CursorStats
// ---------------------------------------------------------------------------

/// Counters describing how a [`MemoryCursor`] was driven.
#[derive(Debug, Default)]
pub struct CursorStats {
    /// Total `fetch_more` calls.
    fetch_calls: AtomicUsize,
    /// Fetches issued but not yet completed.
    in_flight: AtomicUsize,
    /// High-water mark of `in_flight`.
    max_in_flight: AtomicUsize,
}

impl CursorStats {
    /// Returns the number of `fetch_more` calls made so far.
    #[must_use]
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::Acquire)
    }

    /// Returns the number of fetches currently outstanding.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Returns the largest number of fetches ever outstanding at once.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::Acquire)
    }

    fn begin(&self) {
        self.fetch_calls.fetch_add(1, Ordering::AcqRel);
        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.max_in_flight.fetch_max(now, Ordering::AcqRel);
    }

    fn end(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

// ---------------------------------------------------------------------------
// MemoryCursor
// ---------------------------------------------------------------------------

struct Inner<T> {
    /// Items already merged and ready for `next()`.
    buffer: VecDeque<T>,
    /// Pages not yet fetched.
    pages: VecDeque<Vec<T>>,
    /// Number of fetches that have completed (successfully or not).
    fetches: usize,
    /// 1-based fetch number that fails, with its message.
    fail_on: Option<(usize, String)>,
}

impl<T> Inner<T> {
    fn merge_next_page(&mut self) -> Result<(), MemoryCursorError> {
        self.fetches += 1;
        if let Some((nth, message)) = &self.fail_on {
            if *nth == self.fetches {
                return Err(MemoryCursorError(message.clone()));
            }
        }
        if let Some(page) = self.pages.pop_front() {
            self.buffer.extend(page);
        }
        Ok(())
    }
}

/// Paginated cursor over in-memory pages.
///
/// ```rust,ignore
/// // 7 items: first page of 5 buffered, second page of 2 fetched on demand.
/// let cursor = MemoryCursor::paged((0..7).collect(), 5);
/// assert_eq!(cursor.available_without_fetching(), 5);
/// ```
pub struct MemoryCursor<T> {
    inner: Arc<Mutex<Inner<T>>>,
    stats: Arc<CursorStats>,
    fetch_delay: Option<Duration>,
}

impl<T: Send + 'static> MemoryCursor<T> {
    /// Creates a cursor from explicit pages.
    ///
    /// The first page is buffered immediately; each later page is merged by
    /// one `fetch_more` call.
    #[must_use]
    pub fn from_pages(pages: Vec<Vec<T>>) -> Self {
        let mut pages: VecDeque<Vec<T>> = pages.into();
        let buffer = pages.pop_front().map(VecDeque::from).unwrap_or_default();
        Self {
            inner: Arc::new(Mutex::new(Inner {
                buffer,
                pages,
                fetches: 0,
                fail_on: None,
            })),
            stats: Arc::new(CursorStats::default()),
            fetch_delay: None,
        }
    }

    /// Splits `items` into pages of `page_size` (minimum 1).
    #[must_use]
    pub fn paged(items: Vec<T>, page_size: usize) -> Self {
        let page_size = page_size.max(1);
        let mut pages = Vec::with_capacity(items.len().div_ceil(page_size));
        let mut items = items.into_iter().peekable();
        while items.peek().is_some() {
            pages.push(items.by_ref().take(page_size).collect());
        }
        Self::from_pages(pages)
    }

    /// Creates an exhausted cursor with no items.
    #[must_use]
    pub fn empty() -> Self {
        Self::from_pages(Vec::new())
    }

    /// Makes the `nth` (1-based) `fetch_more` call fail with `message`.
    #[must_use]
    pub fn fail_on_fetch(self, nth: usize, message: impl Into<String>) -> Self {
        self.inner.lock().fail_on = Some((nth, message.into()));
        self
    }

    /// Delays every fetch by `delay` before merging the page.
    #[must_use]
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    /// Returns the shared fetch counters.
    #[must_use]
    pub fn stats(&self) -> Arc<CursorStats> {
        Arc::clone(&self.stats)
    }
}

impl<T: Send + 'static> PagedCursor for MemoryCursor<T> {
    type Item = T;
    type Error = MemoryCursorError;

    fn available_without_fetching(&self) -> usize {
        self.inner.lock().buffer.len()
    }

    fn is_exhausted(&self) -> bool {
        self.inner.lock().pages.is_empty()
    }

    fn next(&mut self) -> Option<T> {
        self.inner.lock().buffer.pop_front()
    }

    fn fetch_more(&mut self) -> FetchFuture<MemoryCursorError> {
        let inner = Arc::clone(&self.inner);
        let stats = Arc::clone(&self.stats);
        let delay = self.fetch_delay;
        stats.begin();
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let result = inner.lock().merge_next_page();
            stats.end();
            result
        })
    }
}

impl<T> std::fmt::Debug for MemoryCursor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("MemoryCursor")
            .field("buffered", &inner.buffer.len())
            .field("pages_remaining", &inner.pages.len())
            .field("fetch_delay", &self.fetch_delay)
            .finish_non_exhaustive()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paged_splits_items() {
        let cursor = MemoryCursor::paged((0..7).collect::<Vec<i32>>(), 5);
        assert_eq!(cursor.available_without_fetching(), 5);
        assert!(!cursor.is_exhausted());
    }

    #[test]
    fn test_empty_cursor_is_exhausted() {
        let mut cursor = MemoryCursor::<i32>::empty();
        assert_eq!(cursor.available_without_fetching(), 0);
        assert!(cursor.is_exhausted());
        assert!(cursor.next().is_none());
    }

    #[test]
    fn test_single_page_is_exhausted_immediately() {
        let cursor = MemoryCursor::paged(vec![1, 2, 3], 10);
        assert_eq!(cursor.available_without_fetching(), 3);
        assert!(cursor.is_exhausted());
    }

    #[tokio::test]
    async fn test_fetch_more_merges_next_page() {
        let mut cursor = MemoryCursor::paged((0..7).collect::<Vec<i32>>(), 5);
        let drained: Vec<i32> = std::iter::from_fn(|| cursor.next()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);

        cursor.fetch_more().await.unwrap();
        assert!(cursor.is_exhausted());
        assert_eq!(cursor.available_without_fetching(), 2);
        assert_eq!(cursor.next(), Some(5));
        assert_eq!(cursor.next(), Some(6));
        assert_eq!(cursor.stats().fetch_calls(), 1);
        assert_eq!(cursor.stats().in_flight(), 0);
    }

    #[tokio::test]
    async fn test_fail_on_fetch() {
        let mut cursor = MemoryCursor::paged((0..10).collect::<Vec<i32>>(), 5)
            .fail_on_fetch(1, "timeout");
        let err = cursor.fetch_more().await.unwrap_err();
        assert_eq!(err.to_string(), "timeout");
        assert_eq!(cursor.available_without_fetching(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_delay_tracks_in_flight() {
        let mut cursor = MemoryCursor::paged((0..4).collect::<Vec<i32>>(), 2)
            .with_fetch_delay(Duration::from_millis(50));
        let stats = cursor.stats();
        let fetch = tokio::spawn(cursor.fetch_more());
        tokio::task::yield_now().await;
        assert_eq!(stats.in_flight(), 1);

        fetch.await.unwrap().unwrap();
        assert_eq!(stats.in_flight(), 0);
        assert_eq!(stats.max_in_flight(), 1);
    }
}
