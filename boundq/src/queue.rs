//! The bounded queue handle.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::backend::Backend;
use crate::error::{Done, Error, PopError, PushError, Result};
use crate::lock_backend::LockBackend;
use crate::semaphore_backend::SemaphoreBackend;

/// A thread-safe fixed-capacity FIFO queue with blocking backpressure.
///
/// `push` blocks while the queue is full and `pop` blocks while it is empty
/// and still open. After [`close`](Self::close), consumers drain whatever is
/// left and then receive [`Done`]; producers are refused with
/// [`PushError::Closed`], which hands the item back.
///
/// The handle is cheap to clone: clones share the same queue through an
/// `Arc`, so each producer and consumer thread gets its own handle.
///
/// The blocking strategy is chosen by the `B` parameter, see
/// [`LockQueue`] and [`SemaphoreQueue`].
///
/// # Example
///
/// ```
/// use boundq::LockQueue;
/// use std::thread;
///
/// let queue = LockQueue::new(5);
/// let producer_queue = queue.clone();
///
/// let producer = thread::spawn(move || {
///     for i in 1..=10 {
///         producer_queue.push(i).unwrap();
///     }
///     producer_queue.close();
/// });
///
/// let items: Vec<i32> = queue.iter().collect();
/// producer.join().unwrap();
/// assert_eq!(items, (1..=10).collect::<Vec<_>>());
/// ```
pub struct BoundedQueue<T, B = LockBackend<T>> {
    inner: Arc<B>,
    _item: PhantomData<fn(T) -> T>,
}

/// Queue backed by one lock and broadcast condition variables.
pub type LockQueue<T> = BoundedQueue<T, LockBackend<T>>;

/// Queue backed by free-slot and filled-slot counting semaphores.
pub type SemaphoreQueue<T> = BoundedQueue<T, SemaphoreBackend<T>>;

impl<T, B> Clone for BoundedQueue<T, B> {
    fn clone(&self) -> Self {
        BoundedQueue {
            inner: Arc::clone(&self.inner),
            _item: PhantomData,
        }
    }
}

impl<T, B: Backend<T>> BoundedQueue<T, B> {
    /// Creates an empty queue holding at most `capacity` items.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be greater than 0");
        BoundedQueue {
            inner: Arc::new(B::with_capacity(capacity)),
            _item: PhantomData,
        }
    }

    /// Creates an empty queue, rejecting a zero capacity with an error.
    pub fn try_new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidCapacity(capacity));
        }
        Ok(Self::new(capacity))
    }

    /// Appends an item, blocking while the queue is full.
    pub fn push(&self, item: T) -> std::result::Result<(), PushError<T>> {
        self.inner.push(item)
    }

    /// Appends an item if a slot is free, without blocking.
    pub fn try_push(&self, item: T) -> std::result::Result<(), PushError<T>> {
        self.inner.try_push(item)
    }

    /// Appends an item, waiting at most `timeout` for a free slot.
    ///
    /// On timeout the queue is left untouched and the item is returned in
    /// [`PushError::Timeout`].
    pub fn push_timeout(&self, item: T, timeout: Duration) -> std::result::Result<(), PushError<T>> {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.inner.push_deadline(item, deadline),
            None => self.inner.push(item),
        }
    }

    /// Removes the front item, blocking while the queue is empty and open.
    ///
    /// Returns `Err(Done)` once the queue is closed and drained; from then on
    /// every call returns immediately.
    pub fn pop(&self) -> std::result::Result<T, Done> {
        self.inner.pop()
    }

    /// Removes the front item if one is queued, without blocking.
    pub fn try_pop(&self) -> std::result::Result<T, PopError> {
        self.inner.try_pop()
    }

    /// Removes the front item, waiting at most `timeout` for one.
    pub fn pop_timeout(&self, timeout: Duration) -> std::result::Result<T, PopError> {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.inner.pop_deadline(deadline),
            None => self.inner.pop().map_err(PopError::from),
        }
    }

    /// Closes the queue: no more items will be pushed.
    ///
    /// Wakes every blocked consumer and producer. Returns `true` if this
    /// call closed the queue, `false` if it was already closed.
    pub fn close(&self) -> bool {
        let closed = self.inner.close();
        if closed {
            debug!(remaining = self.inner.len(), "queue closed");
        }
        closed
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Returns the number of queued items.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Returns the backend, for strategy-specific inspection.
    pub fn backend(&self) -> &B {
        &self.inner
    }

    /// Returns a blocking iterator that pops until end of stream.
    pub fn iter(&self) -> Iter<'_, T, B> {
        Iter { queue: self }
    }
}

impl<T: Clone, B: Backend<T>> BoundedQueue<T, B> {
    /// Returns a copy of the queued items, front first.
    pub fn to_vec(&self) -> Vec<T> {
        self.inner.snapshot()
    }
}

/// Blocking iterator over a queue, see [`BoundedQueue::iter`].
pub struct Iter<'a, T, B> {
    queue: &'a BoundedQueue<T, B>,
}

impl<T, B: Backend<T>> Iterator for Iter<'_, T, B> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.queue.pop().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_try_new_rejects_zero() {
        assert_eq!(
            LockQueue::<i32>::try_new(0).err(),
            Some(Error::InvalidCapacity(0))
        );
        assert!(SemaphoreQueue::<i32>::try_new(0).is_err());
        assert_eq!(SemaphoreQueue::<i32>::try_new(3).unwrap().capacity(), 3);
    }

    #[test]
    fn test_try_new_huge_capacity() {
        let queue = LockQueue::<u64>::try_new(usize::MAX).unwrap();
        assert_eq!(queue.capacity(), usize::MAX);
        queue.push(1).unwrap();
        assert!(!queue.is_full());
        assert_eq!(queue.pop(), Ok(1));

        let queue = SemaphoreQueue::<u64>::try_new(usize::MAX).unwrap();
        queue.push(2).unwrap();
        assert_eq!(queue.backend().empty_slots(), usize::MAX - 1);
        assert_eq!(queue.try_pop(), Ok(2));
    }

    #[test]
    #[should_panic(expected = "capacity must be greater than 0")]
    fn test_new_zero_panics() {
        let _ = LockQueue::<i32>::new(0);
    }

    #[test]
    fn test_default_backend_is_lock() {
        let queue: BoundedQueue<i32> = BoundedQueue::new(2);
        let _: &LockBackend<i32> = queue.backend();
    }

    #[test]
    fn test_capacity_and_len() {
        let queue = LockQueue::new(4);
        assert_eq!(queue.capacity(), 4);
        assert!(queue.is_empty());
        assert!(!queue.is_full());

        for i in 0..4 {
            queue.push(i).unwrap();
        }
        assert_eq!(queue.len(), 4);
        assert!(queue.is_full());
        assert_eq!(queue.to_vec(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_clone_shares_queue() {
        let queue = SemaphoreQueue::new(2);
        let other = queue.clone();
        queue.push("a").unwrap();
        assert_eq!(other.pop(), Ok("a"));
        other.close();
        assert!(queue.is_closed());
    }

    #[test]
    fn test_close_returns_true_once() {
        let queue = LockQueue::<i32>::new(1);
        assert!(queue.close());
        assert!(!queue.close());
    }

    #[test]
    fn test_timeouts() {
        let queue = SemaphoreQueue::new(1);
        assert_eq!(queue.pop_timeout(Duration::from_millis(10)), Err(PopError::Timeout));
        queue.push(1).unwrap();
        let err = queue.push_timeout(2, Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, PushError::Timeout(2)));
        assert_eq!(queue.pop_timeout(Duration::MAX), Ok(1));
    }

    #[test]
    fn test_iter_stops_at_end_of_stream() {
        let queue = LockQueue::new(2);
        let producer_queue = queue.clone();
        let producer = thread::spawn(move || {
            for i in 0..20 {
                producer_queue.push(i).unwrap();
            }
            producer_queue.close();
        });

        let items: Vec<_> = queue.iter().collect();
        producer.join().unwrap();
        assert_eq!(items, (0..20).collect::<Vec<_>>());
        assert_eq!(queue.pop(), Err(Done));
    }
}
