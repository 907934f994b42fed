//! Synchronization backends behind [`BoundedQueue`](crate::BoundedQueue).

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::{Done, Error, PopError, PushError};

/// Blocking behavior of a bounded FIFO queue.
///
/// A backend owns the storage and decides how callers wait: on a condition
/// variable ([`LockBackend`](crate::LockBackend)) or on a pair of counting
/// semaphores ([`SemaphoreBackend`](crate::SemaphoreBackend)). Both must keep
/// the same contract:
///
/// - items leave in the order they entered, each exactly once;
/// - the length never exceeds the capacity;
/// - after `close()`, remaining items can still be popped, then every pop
///   returns [`Done`] without blocking, and every push fails with
///   [`PushError::Closed`].
pub trait Backend<T>: Send + Sync {
    /// Creates an empty backend. `capacity` is at least 1.
    fn with_capacity(capacity: usize) -> Self
    where
        Self: Sized;

    /// Appends `item`, blocking while the queue is full.
    fn push(&self, item: T) -> Result<(), PushError<T>>;

    /// Appends `item` only if a slot is free right now.
    fn try_push(&self, item: T) -> Result<(), PushError<T>>;

    /// Appends `item`, blocking at most until `deadline`.
    fn push_deadline(&self, item: T, deadline: Instant) -> Result<(), PushError<T>>;

    /// Removes the front item, blocking while the queue is empty and open.
    fn pop(&self) -> Result<T, Done>;

    /// Removes the front item only if one is available right now.
    fn try_pop(&self) -> Result<T, PopError>;

    /// Removes the front item, blocking at most until `deadline`.
    fn pop_deadline(&self, deadline: Instant) -> Result<T, PopError>;

    /// Marks the queue closed and wakes every waiter.
    ///
    /// Returns `true` for the call that actually closed the queue.
    fn close(&self) -> bool;

    fn is_closed(&self) -> bool;

    fn len(&self) -> usize;

    fn capacity(&self) -> usize;

    /// Copies the queued items, front first.
    fn snapshot(&self) -> Vec<T>
    where
        T: Clone;
}

/// Selects a backend at runtime (configuration, command line).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// One lock plus broadcast condition variables.
    #[default]
    Lock,
    /// Free-slot and filled-slot counting semaphores plus a buffer lock.
    Semaphore,
}

impl Strategy {
    pub const ALL: [Strategy; 2] = [Strategy::Lock, Strategy::Semaphore];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Lock => "lock",
            Strategy::Semaphore => "semaphore",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lock" | "condvar" | "mutex" => Ok(Strategy::Lock),
            "semaphore" | "sem" => Ok(Strategy::Semaphore),
            other => Err(Error::InvalidConfig(format!(
                "unknown strategy {:?} (expected \"lock\" or \"semaphore\")",
                other
            ))),
        }
    }
}
