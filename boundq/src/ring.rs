//! Bounded FIFO storage shared by both backends.

use std::collections::VecDeque;

/// Slots reserved up front; the deque grows on demand past this, never past
/// the capacity.
const PREALLOC_SLOTS: usize = 64;

/// A capacity-bounded FIFO of items.
///
/// `Ring<T>` does no synchronization of its own; each backend keeps it behind
/// a lock. The caller is responsible for never pushing into a full ring, which
/// both backends guarantee by waiting (condvar) or by holding a free-slot
/// permit (semaphore) before calling [`Ring::push_back`].
///
/// The capacity is a bound, not an allocation: only `min(capacity, 64)`
/// slots are reserved at construction.
pub(crate) struct Ring<T> {
    buf: VecDeque<T>,
    capacity: usize,
}

impl<T> Ring<T> {
    /// Creates an empty ring holding at most `capacity` items.
    pub(crate) fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be greater than 0");
        Ring {
            buf: VecDeque::with_capacity(capacity.min(PREALLOC_SLOTS)),
            capacity,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn len(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub(crate) fn is_full(&self) -> bool {
        self.buf.len() == self.capacity
    }

    /// Appends `item` at the back.
    ///
    /// Pushing into a full ring is a capacity violation: the backends make it
    /// unreachable, so it is only checked in debug builds.
    pub(crate) fn push_back(&mut self, item: T) {
        debug_assert!(!self.is_full(), "capacity violation: push into a full ring");
        self.buf.push_back(item);
    }

    /// Removes and returns the front item, or `None` when empty.
    pub(crate) fn pop_front(&mut self) -> Option<T> {
        self.buf.pop_front()
    }
}

impl<T: Clone> Ring<T> {
    /// Returns a copy of the items from front to back.
    pub(crate) fn to_vec(&self) -> Vec<T> {
        self.buf.iter().cloned().collect()
    }
}
