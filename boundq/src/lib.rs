//! Bounded blocking FIFO queue for producer/consumer pipelines.
//!
//! [`BoundedQueue<T, B>`] is a fixed-capacity, thread-safe FIFO. Producers
//! block while it is full, consumers block while it is empty, and a single
//! `close()` ends the stream: consumers drain what is left and then get
//! [`Done`], producers are refused with [`PushError::Closed`].
//!
//! # Backends
//!
//! The blocking behavior comes from the backend parameter `B`:
//!
//! - [`LockBackend`] ([`LockQueue`]): one lock over the ring and the closed
//!   flag, with broadcast condition variables for "item available" and
//!   "slot available". Waiters always re-check their predicate.
//! - [`SemaphoreBackend`] ([`SemaphoreQueue`]): a free-slot semaphore and a
//!   filled-slot semaphore pace producers and consumers; a short buffer lock
//!   only covers the ring mutation. Both semaphores are closeable, so this
//!   backend supports the same shutdown protocol.
//!
//! Both keep the same guarantees: strict FIFO, no loss, no duplication, and
//! `0 <= len <= capacity` at every observation.
//!
//! ```
//! use boundq::{SemaphoreQueue, Done};
//! use std::thread;
//!
//! let queue = SemaphoreQueue::new(1);
//! let producer_queue = queue.clone();
//!
//! let producer = thread::spawn(move || {
//!     for i in 1..=10 {
//!         producer_queue.push(i).unwrap();
//!     }
//!     producer_queue.close();
//! });
//!
//! let mut items = Vec::new();
//! while let Ok(item) = queue.pop() {
//!     items.push(item);
//! }
//! producer.join().unwrap();
//!
//! assert_eq!(items, (1..=10).collect::<Vec<_>>());
//! assert_eq!(queue.pop(), Err(Done));
//! ```
//!
//! # Drivers
//!
//! [`Producer`] and [`Consumer`] wrap the push and pop loops with a small
//! lifecycle and report what they did through an [`EventSink`].
//! [`Pipeline`] wires N producers and M consumers to one queue from a
//! [`PipelineConfig`].

mod backend;
mod driver;
mod error;
mod lock_backend;
mod pipeline;
mod queue;
mod ring;
mod semaphore;
mod semaphore_backend;
mod sink;

pub use backend::{Backend, Strategy};
pub use driver::{Consumer, ConsumerReport, DriverState, Producer, ProducerReport};
pub use error::{Done, Error, PopError, PushError, Result};
pub use lock_backend::LockBackend;
pub use pipeline::{Pipeline, PipelineConfig, PipelineReport};
pub use queue::{BoundedQueue, Iter, LockQueue, SemaphoreQueue};
pub use semaphore_backend::SemaphoreBackend;
pub use sink::{Event, EventKind, EventSink, LineSink, NullSink, RecordingSink, TracingSink};


#[cfg(test)]
mod send_sync_tests {
    use super::*;

    #[test]
    fn test_queue_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<LockQueue<i32>>();
        assert_send_sync::<SemaphoreQueue<i32>>();
        assert_send_sync::<LockBackend<String>>();
        assert_send_sync::<SemaphoreBackend<String>>();
    }

    #[test]
    fn test_queue_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<LockQueue<i32>>();
        assert_clone::<SemaphoreQueue<i32>>();
    }
}
