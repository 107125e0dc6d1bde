//! Subscription and stream configuration types.

use tokio::runtime::Handle;

/// Default capacity of the notification queue between driver and consumer.
pub const DEFAULT_DELIVERY_BUFFER: usize = 256;

/// Minimum notification queue capacity.
pub const MIN_DELIVERY_BUFFER: usize = 1;

/// Maximum notification queue capacity.
pub const MAX_DELIVERY_BUFFER: usize = 1 << 16;

/// Default number of items a [`CursorStream`](super::CursorStream) keeps requested.
pub const DEFAULT_PREFETCH: u32 = 64;

// ---------------------------------------------------------------------------
// SubscriptionConfig
// ---------------------------------------------------------------------------

/// Configuration for a single subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    /// Name used in logs and metrics (typically the query).
    pub name: String,
    /// Capacity of the notification queue.
    ///
    /// When full, the driver waits before draining more items from the
    /// cursor. The consumer is never blocked by it.
    pub delivery_buffer: usize,
    /// Runtime that hosts the driver and delivery tasks.
    ///
    /// `None` uses the runtime the subscriber is registered from.
    pub runtime: Option<Handle>,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            name: String::from("cursor"),
            delivery_buffer: DEFAULT_DELIVERY_BUFFER,
            runtime: None,
        }
    }
}

impl SubscriptionConfig {
    /// Creates a default configuration with the given name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Sets the notification queue capacity.
    #[must_use]
    pub fn with_delivery_buffer(mut self, capacity: usize) -> Self {
        self.delivery_buffer = capacity;
        self
    }

    /// Pins the subscription's tasks to a specific runtime.
    #[must_use]
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Returns the queue capacity clamped to the supported range.
    #[must_use]
    pub fn effective_delivery_buffer(&self) -> usize {
        self.delivery_buffer.clamp(MIN_DELIVERY_BUFFER, MAX_DELIVERY_BUFFER)
    }

    pub(crate) fn spawn<F>(&self, task: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: std::future::Future + Send + 'static,
        F::Output: Send + 'static,
    {
        match &self.runtime {
            Some(handle) => handle.spawn(task),
            None => tokio::spawn(task),
        }
    }
}

// ---------------------------------------------------------------------------
// StreamConfig
// ---------------------------------------------------------------------------

/// Configuration for a [`CursorStream`](super::CursorStream).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// Items kept requested ahead of consumption (minimum 1).
    pub prefetch: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            prefetch: DEFAULT_PREFETCH,
        }
    }
}

impl StreamConfig {
    /// Creates a stream configuration with the given prefetch.
    #[must_use]
    pub fn with_prefetch(prefetch: u32) -> Self {
        Self { prefetch }
    }

    /// Returns the prefetch, never below 1.
    #[must_use]
    pub fn effective_prefetch(&self) -> u32 {
        self.prefetch.max(1)
    }
}
