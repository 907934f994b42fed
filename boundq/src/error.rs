//! Error types for queue operations.

use std::error::Error as StdError;
use std::fmt;

/// Result type alias for boundq.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building a queue or a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Capacity must be at least one slot.
    #[error("invalid capacity: {0} (must be at least 1)")]
    InvalidCapacity(usize),

    /// Invalid pipeline configuration.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// A producer pushed after the queue was closed.
    #[error("push after close: {producer} was refused after {pushed} items")]
    PushAfterClose { producer: String, pushed: usize },

    /// Delivered items do not match what was produced.
    #[error("delivery mismatch: {0}")]
    Delivery(String),
}

/// Error returned by the push family of operations.
///
/// Every variant hands the rejected item back to the caller, so a refused
/// push never loses data.
pub enum PushError<T> {
    /// The queue was closed before the item could be appended.
    ///
    /// Pushing after `close()` is a caller contract violation; producers
    /// blocked on a full queue when it closes are released with this too.
    Closed(T),
    /// The queue was full (`try_push` only).
    Full(T),
    /// No slot became free before the deadline (`push_timeout` only).
    Timeout(T),
}

impl<T> PushError<T> {
    /// Returns the item that was not pushed.
    pub fn into_inner(self) -> T {
        match self {
            PushError::Closed(item) | PushError::Full(item) | PushError::Timeout(item) => item,
        }
    }

    /// Returns a reference to the item that was not pushed.
    pub fn item(&self) -> &T {
        match self {
            PushError::Closed(item) | PushError::Full(item) | PushError::Timeout(item) => item,
        }
    }

    /// Returns true if the push failed because the queue is closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, PushError::Closed(_))
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Closed(_) => f.write_str("Closed(..)"),
            PushError::Full(_) => f.write_str("Full(..)"),
            PushError::Timeout(_) => f.write_str("Timeout(..)"),
        }
    }
}

impl<T> fmt::Display for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Closed(_) => write!(f, "queue: push after close"),
            PushError::Full(_) => write!(f, "queue: full"),
            PushError::Timeout(_) => write!(f, "queue: push timed out"),
        }
    }
}

impl<T> StdError for PushError<T> {}

/// Error returned by the non-blocking and timed pop operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PopError {
    /// The queue is empty but still open (`try_pop` only).
    #[error("queue: empty")]
    Empty,
    /// No item arrived before the deadline (`pop_timeout` only).
    #[error("queue: pop timed out")]
    Timeout,
    /// The queue is closed and drained: end of stream.
    #[error("queue: closed")]
    Closed,
}

/// End-of-stream marker.
///
/// Returned by `pop()` once the queue has been closed and every item has
/// been consumed. It is the normal terminal signal of a consumer loop, not a
/// failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Done;

impl fmt::Display for Done {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue: end of stream")
    }
}

impl StdError for Done {}

impl From<Done> for PopError {
    fn from(_: Done) -> Self {
        PopError::Closed
    }
}
