//! Producer and consumer drivers.
//!
//! A driver owns a queue handle and runs one loop on the calling thread:
//! `Idle → Running → Finished`. Producers push a finite sequence and, by
//! default, close the queue after the last item. Consumers pop until end of
//! stream, or until an optional item limit is reached.

use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::warn;

use crate::backend::Backend;
use crate::error::{Done, PushError};
use crate::lock_backend::LockBackend;
use crate::queue::BoundedQueue;
use crate::sink::{EventKind, EventSink, TracingSink};

/// Lifecycle of a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverState {
    Idle,
    Running,
    Finished,
}

/// Outcome of a producer run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProducerReport {
    pub name: String,
    /// Items successfully pushed.
    pub pushed: usize,
    /// Whether this producer closed the queue.
    pub closed: bool,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

/// Outcome of a consumer run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsumerReport {
    pub name: String,
    /// Items popped.
    pub consumed: usize,
    /// `true` if the loop ended on end of stream, `false` if on the limit.
    pub end_of_stream: bool,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

/// Pushes a sequence of items into a queue.
pub struct Producer<T, B = LockBackend<T>> {
    name: String,
    queue: BoundedQueue<T, B>,
    sink: Arc<dyn EventSink>,
    delay: Duration,
    close_when_done: bool,
    state: DriverState,
}

impl<T, B> Producer<T, B>
where
    T: fmt::Debug,
    B: Backend<T>,
{
    /// Creates a producer that closes the queue after its last item.
    pub fn new(name: impl Into<String>, queue: BoundedQueue<T, B>) -> Self {
        Producer {
            name: name.into(),
            queue,
            sink: Arc::new(TracingSink),
            delay: Duration::ZERO,
            close_when_done: true,
            state: DriverState::Idle,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Sleeps for `delay` after every push.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Whether to close the queue after the last item (default `true`).
    ///
    /// With several producers on one queue, none of them should close it;
    /// whoever joins them closes it instead.
    pub fn close_when_done(mut self, close: bool) -> Self {
        self.close_when_done = close;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Pushes every item in order, blocking under backpressure.
    ///
    /// `Produced` is recorded as each item is handed to the queue. Stops at
    /// the first refused push (the queue was closed by someone else), records
    /// `Rejected` for that item and returns the error holding it.
    pub fn run<I>(&mut self, items: I) -> Result<ProducerReport, PushError<T>>
    where
        I: IntoIterator<Item = T>,
    {
        let start = Instant::now();
        self.state = DriverState::Running;
        self.sink.record(EventKind::Started, &self.name, &self.queue.capacity());

        let mut pushed = 0;
        for item in items {
            self.sink.record(EventKind::Produced, &self.name, &item);
            if let Err(err) = self.queue.push(item) {
                warn!(producer = %self.name, pushed, "push after close");
                self.sink.record(EventKind::Rejected, &self.name, err.item());
                self.state = DriverState::Finished;
                return Err(err);
            }
            pushed += 1;
            if !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
        }

        let closed = self.close_when_done && self.queue.close();
        if closed {
            self.sink.record(EventKind::Closed, &self.name, &pushed);
        }

        self.state = DriverState::Finished;
        self.sink.record(EventKind::Finished, &self.name, &pushed);
        Ok(ProducerReport {
            name: self.name.clone(),
            pushed,
            closed,
            elapsed: start.elapsed(),
        })
    }
}

/// Pops items from a queue until end of stream.
pub struct Consumer<T, B = LockBackend<T>> {
    name: String,
    queue: BoundedQueue<T, B>,
    sink: Arc<dyn EventSink>,
    delay: Duration,
    limit: Option<usize>,
    state: DriverState,
}

impl<T, B> Consumer<T, B>
where
    T: fmt::Debug,
    B: Backend<T>,
{
    pub fn new(name: impl Into<String>, queue: BoundedQueue<T, B>) -> Self {
        Consumer {
            name: name.into(),
            queue,
            sink: Arc::new(TracingSink),
            delay: Duration::ZERO,
            limit: None,
            state: DriverState::Idle,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Sleeps for `delay` after every pop.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Stops after `limit` items even if the queue is never closed.
    ///
    /// This is the fixed-count protocol: producer and consumer agree on the
    /// number of items up front instead of relying on close.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Pops items and hands each to `handle` until end of stream or limit.
    ///
    /// A momentarily empty queue is not terminal: the loop blocks until an
    /// item arrives or the queue is closed and drained.
    pub fn run<F>(&mut self, mut handle: F) -> ConsumerReport
    where
        F: FnMut(T),
    {
        let start = Instant::now();
        self.state = DriverState::Running;
        self.sink.record(EventKind::Started, &self.name, &self.queue.capacity());

        let mut consumed = 0;
        let mut end_of_stream = false;
        loop {
            if self.limit.is_some_and(|limit| consumed >= limit) {
                break;
            }
            match self.queue.pop() {
                Ok(item) => {
                    self.sink.record(EventKind::Consumed, &self.name, &item);
                    handle(item);
                    consumed += 1;
                    if !self.delay.is_zero() {
                        thread::sleep(self.delay);
                    }
                }
                Err(Done) => {
                    end_of_stream = true;
                    break;
                }
            }
        }

        self.state = DriverState::Finished;
        self.sink.record(EventKind::Finished, &self.name, &consumed);
        ConsumerReport {
            name: self.name.clone(),
            consumed,
            end_of_stream,
            elapsed: start.elapsed(),
        }
    }

    /// Runs the loop and returns the popped items in order.
    pub fn collect(&mut self) -> (ConsumerReport, Vec<T>) {
        let mut items = Vec::new();
        let report = self.run(|item| items.push(item));
        (report, items)
    }
}

pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}
