//! Dual counting-semaphore backend.

use std::time::Instant;

use parking_lot::Mutex;

use crate::backend::Backend;
use crate::error::{Done, PopError, PushError};
use crate::ring::Ring;
use crate::semaphore::{AcquireError, Semaphore};

/// Bounded FIFO paced by two counting semaphores.
///
/// `empty_slots` starts at the capacity and counts free slots, `full_slots`
/// starts at zero and counts queued items. Producers wait on `empty_slots`,
/// consumers on `full_slots`; the buffer lock only serializes the ring
/// mutation itself.
///
/// Closing closes both semaphores. Consumers keep taking `full_slots`
/// permits until the queued items run out and then see end of stream;
/// producers waiting for a free slot are released with
/// [`PushError::Closed`].
pub struct SemaphoreBackend<T> {
    buffer: Mutex<SlotBuffer<T>>,
    empty_slots: Semaphore,
    full_slots: Semaphore,
}

struct SlotBuffer<T> {
    ring: Ring<T>,
    closed: bool,
}

impl<T> SemaphoreBackend<T> {
    /// Free-slot permits currently available.
    pub fn empty_slots(&self) -> usize {
        self.empty_slots.available_permits()
    }

    /// Filled-slot permits currently available.
    pub fn full_slots(&self) -> usize {
        self.full_slots.available_permits()
    }

    fn push_with<F>(&self, item: T, acquire: F) -> Result<(), PushError<T>>
    where
        F: FnOnce(&Semaphore) -> Result<(), AcquireError>,
    {
        match acquire(&self.empty_slots) {
            Ok(()) => {}
            Err(AcquireError::Closed) => return Err(PushError::Closed(item)),
            Err(AcquireError::NoPermits) => return Err(PushError::Full(item)),
            Err(AcquireError::Timeout) => return Err(PushError::Timeout(item)),
        }

        let mut buffer = self.buffer.lock();
        if buffer.closed {
            // Closed while we held a free slot: hand it back untouched.
            drop(buffer);
            self.empty_slots.release();
            return Err(PushError::Closed(item));
        }
        buffer.ring.push_back(item);
        // Publish the item before the buffer lock is released so close()
        // cannot land between the append and its filled-slot permit.
        self.full_slots.release();
        drop(buffer);
        Ok(())
    }

    fn pop_with<F>(&self, acquire: F) -> Result<T, PopError>
    where
        F: FnOnce(&Semaphore) -> Result<(), AcquireError>,
    {
        match acquire(&self.full_slots) {
            Ok(()) => {}
            Err(AcquireError::Closed) => return Err(PopError::Closed),
            Err(AcquireError::NoPermits) => return Err(PopError::Empty),
            Err(AcquireError::Timeout) => return Err(PopError::Timeout),
        }

        let mut buffer = self.buffer.lock();
        let item = buffer
            .ring
            .pop_front()
            .expect("filled-slot permit held but the ring is empty");
        drop(buffer);
        self.empty_slots.release();
        Ok(item)
    }
}

impl<T: Send> Backend<T> for SemaphoreBackend<T> {
    fn with_capacity(capacity: usize) -> Self {
        SemaphoreBackend {
            buffer: Mutex::new(SlotBuffer {
                ring: Ring::new(capacity),
                closed: false,
            }),
            empty_slots: Semaphore::new(capacity, capacity),
            full_slots: Semaphore::new(0, capacity),
        }
    }

    fn push(&self, item: T) -> Result<(), PushError<T>> {
        self.push_with(item, Semaphore::acquire)
    }

    fn try_push(&self, item: T) -> Result<(), PushError<T>> {
        self.push_with(item, Semaphore::try_acquire)
    }

    fn push_deadline(&self, item: T, deadline: Instant) -> Result<(), PushError<T>> {
        self.push_with(item, |sem| sem.acquire_deadline(deadline))
    }

    fn pop(&self) -> Result<T, Done> {
        self.pop_with(Semaphore::acquire).map_err(|_| Done)
    }

    fn try_pop(&self) -> Result<T, PopError> {
        self.pop_with(Semaphore::try_acquire)
    }

    fn pop_deadline(&self, deadline: Instant) -> Result<T, PopError> {
        self.pop_with(|sem| sem.acquire_deadline(deadline))
    }

    fn close(&self) -> bool {
        let mut buffer = self.buffer.lock();
        if buffer.closed {
            return false;
        }
        buffer.closed = true;
        self.full_slots.close();
        self.empty_slots.close();
        drop(buffer);
        true
    }

    fn is_closed(&self) -> bool {
        self.buffer.lock().closed
    }

    fn len(&self) -> usize {
        self.buffer.lock().ring.len()
    }

    fn capacity(&self) -> usize {
        self.buffer.lock().ring.capacity()
    }

    fn snapshot(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.buffer.lock().ring.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn assert_counters<T: Send>(backend: &SemaphoreBackend<T>) {
        let len = backend.len();
        assert_eq!(backend.empty_slots(), backend.capacity() - len);
        assert_eq!(backend.full_slots(), len);
    }

    #[test]
    fn test_counters_track_length() {
        let backend = SemaphoreBackend::with_capacity(3);
        assert_counters(&backend);

        backend.push(1).unwrap();
        backend.push(2).unwrap();
        assert_counters(&backend);
        assert_eq!(backend.full_slots(), 2);

        assert_eq!(backend.pop(), Ok(1));
        assert_counters(&backend);

        backend.push(3).unwrap();
        backend.push(4).unwrap();
        assert!(matches!(backend.try_push(5), Err(PushError::Full(5))));
        assert_counters(&backend);
        assert_eq!(backend.snapshot(), vec![2, 3, 4]);
    }

    #[test]
    fn test_blocked_pop_resumes_after_push() {
        let backend = Arc::new(SemaphoreBackend::with_capacity(2));
        let reader_backend = Arc::clone(&backend);

        let reader = thread::spawn(move || reader_backend.pop());

        thread::sleep(Duration::from_millis(50));
        backend.push(42).unwrap();

        assert_eq!(reader.join().unwrap(), Ok(42));
        assert_counters(&backend);
    }

    #[test]
    fn test_close_drains_then_ends() {
        let backend = SemaphoreBackend::with_capacity(4);
        backend.push(1).unwrap();
        backend.push(2).unwrap();
        assert!(backend.close());

        assert!(matches!(backend.push(3), Err(PushError::Closed(3))));
        assert_eq!(backend.pop(), Ok(1));
        assert_eq!(backend.try_pop(), Ok(2));
        assert_eq!(backend.pop(), Err(Done));
        assert_eq!(backend.try_pop(), Err(PopError::Closed));
        assert_counters(&backend);
    }

    #[test]
    fn test_close_releases_blocked_consumers() {
        let backend = Arc::new(SemaphoreBackend::<u32>::with_capacity(1));
        let readers: Vec<_> = (0..3)
            .map(|_| {
                let backend = Arc::clone(&backend);
                thread::spawn(move || backend.pop())
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        backend.close();

        for reader in readers {
            assert_eq!(reader.join().unwrap(), Err(Done));
        }
    }

    #[test]
    fn test_close_releases_blocked_producer() {
        let backend = Arc::new(SemaphoreBackend::with_capacity(1));
        backend.push(1).unwrap();

        let writer_backend = Arc::clone(&backend);
        let writer = thread::spawn(move || writer_backend.push(2).map_err(PushError::into_inner));

        thread::sleep(Duration::from_millis(50));
        backend.close();

        assert_eq!(writer.join().unwrap(), Err(2));
        assert_eq!(backend.pop(), Ok(1));
        assert_eq!(backend.pop(), Err(Done));
        assert_counters(&backend);
    }

    #[test]
    fn test_push_after_close_returns_free_slot() {
        let backend = SemaphoreBackend::with_capacity(2);
        backend.close();
        // A free-slot permit is available, so the rejection happens under
        // the buffer lock and the permit must come back.
        assert!(matches!(backend.push(1), Err(PushError::Closed(1))));
        assert_eq!(backend.empty_slots(), 2);
        assert_eq!(backend.full_slots(), 0);
    }

    #[test]
    fn test_deadlines() {
        let backend = SemaphoreBackend::with_capacity(1);
        assert_eq!(
            backend.pop_deadline(Instant::now() + Duration::from_millis(20)),
            Err(PopError::Timeout)
        );

        backend.push(7).unwrap();
        let res = backend.push_deadline(8, Instant::now() + Duration::from_millis(20));
        assert!(matches!(res, Err(PushError::Timeout(8))));
        assert_counters(&backend);
        assert_eq!(backend.pop_deadline(Instant::now() + Duration::from_millis(20)), Ok(7));
    }
}
