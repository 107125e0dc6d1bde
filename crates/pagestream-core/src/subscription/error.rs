//! Error types delivered through [`Subscriber::on_error`](super::Subscriber::on_error).

/// Terminal error of a cursor subscription.
///
/// Every variant ends the subscription; there is no resume.
#[derive(Debug, thiserror::Error)]
pub enum StreamError<E> {
    /// `request(n)` was called with `n <= 0`.
    #[error("non-positive request {0}: demand must be greater than zero")]
    NonPositiveRequest(i64),
    /// `subscribe` was called on a publisher that already has a subscriber.
    #[error("publisher does not support multiple subscribers")]
    AlreadySubscribed,
    /// The query producing the cursor failed.
    #[error("query execution failed: {0}")]
    Query(#[source] E),
    /// A page fetch failed.
    #[error("page fetch failed: {0}")]
    Fetch(#[source] E),
    /// The cursor broke its contract.
    #[error("internal error: {0}")]
    Internal(String),
}

impl<E> StreamError<E> {
    /// Returns `true` for errors caused by the consumer misusing the protocol.
    #[must_use]
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::NonPositiveRequest(_) | Self::AlreadySubscribed)
    }

    /// Returns the underlying query or fetch error, if any.
    #[must_use]
    pub fn source_error(&self) -> Option<&E> {
        match self {
            Self::Query(e) | Self::Fetch(e) => Some(e),
            _ => None,
        }
    }

    /// Consumes the error and returns the underlying query or fetch error.
    #[must_use]
    pub fn into_source_error(self) -> Option<E> {
        match self {
            Self::Query(e) | Self::Fetch(e) => Some(e),
            _ => None,
        }
    }
}
