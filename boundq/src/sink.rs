//! Event sinks for driver observability.
//!
//! Drivers report what they do through an [`EventSink`]. None of this
//! affects correctness: output from concurrent drivers may interleave in
//! any order.

use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

/// Kind of event emitted by a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Driver entered its loop.
    Started,
    /// A producer is handing an item to the queue.
    Produced,
    /// An item was popped.
    Consumed,
    /// A push was refused because the queue is closed.
    Rejected,
    /// The producer closed the queue.
    Closed,
    /// Driver left its loop; the payload is its item count.
    Finished,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Started => "Started",
            EventKind::Produced => "Produced",
            EventKind::Consumed => "Consumed",
            EventKind::Rejected => "Rejected",
            EventKind::Closed => "Closed",
            EventKind::Finished => "Finished",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives `(kind, driver, item)` events from producers and consumers.
pub trait EventSink: Send + Sync {
    fn record(&self, kind: EventKind, driver: &str, item: &dyn fmt::Debug);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&self, _kind: EventKind, _driver: &str, _item: &dyn fmt::Debug) {}
}

/// Forwards events to `tracing`.
///
/// Per-item events go to `trace`, everything else to `debug`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, kind: EventKind, driver: &str, item: &dyn fmt::Debug) {
        match kind {
            EventKind::Produced | EventKind::Consumed => {
                trace!(driver, item = ?item, "{}", kind)
            }
            EventKind::Started | EventKind::Rejected | EventKind::Closed | EventKind::Finished => {
                debug!(driver, item = ?item, "{}", kind)
            }
        }
    }
}

/// Writes one line per event, e.g. `Produced: 3`.
///
/// Write failures never reach the drivers; the first one is logged at
/// `warn` and later ones are dropped.
pub struct LineSink<W> {
    out: Mutex<W>,
    write_failed: AtomicBool,
}

impl LineSink<io::Stdout> {
    /// A line sink printing to standard output.
    pub fn stdout() -> Self {
        LineSink::new(io::stdout())
    }
}

impl<W: Write + Send> LineSink<W> {
    pub fn new(out: W) -> Self {
        LineSink {
            out: Mutex::new(out),
            write_failed: AtomicBool::new(false),
        }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl<W: Write + Send> EventSink for LineSink<W> {
    fn record(&self, kind: EventKind, driver: &str, item: &dyn fmt::Debug) {
        let mut out = self.out.lock();
        let res = match kind {
            EventKind::Produced | EventKind::Consumed => writeln!(out, "{}: {:?}", kind, item),
            _ => writeln!(out, "{} {}: {:?}", driver, kind, item),
        };
        if let Err(e) = res {
            if !self.write_failed.swap(true, Ordering::Relaxed) {
                warn!(error = %e, "event line write failed, dropping further errors");
            }
        }
    }
}

/// An event captured by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub driver: String,
    pub item: String,
}

/// Keeps every event in memory, in arrival order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all recorded events.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Returns the debug-formatted payloads of events of one kind.
    pub fn items(&self, kind: EventKind) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.item.clone())
            .collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind == kind).count()
    }
}

impl EventSink for RecordingSink {
    fn record(&self, kind: EventKind, driver: &str, item: &dyn fmt::Debug) {
        self.events.lock().push(Event {
            kind,
            driver: driver.to_string(),
            item: format!("{:?}", item),
        });
    }
}
