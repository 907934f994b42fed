//! Closeable counting semaphore.

use std::time::Instant;

use parking_lot::{Condvar, Mutex};

/// Why an acquire did not obtain a permit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AcquireError {
    /// The semaphore is closed and has no permits left.
    Closed,
    /// No permit was available (`try_acquire` only).
    NoPermits,
    /// The deadline passed before a permit became available.
    Timeout,
}

/// A counting semaphore whose count is bounded by `max`.
///
/// Besides the usual acquire/release pair it can be closed: a closed
/// semaphore still hands out the permits it holds, and once they run out
/// every acquire fails with [`AcquireError::Closed`] instead of blocking.
pub(crate) struct Semaphore {
    state: Mutex<SemaphoreState>,
    cond: Condvar,
    max: usize,
}

struct SemaphoreState {
    permits: usize,
    closed: bool,
}

impl Semaphore {
    /// Creates a semaphore with `permits` initial permits and room for `max`.
    pub(crate) fn new(permits: usize, max: usize) -> Self {
        assert!(permits <= max, "initial permits exceed the maximum");
        Semaphore {
            state: Mutex::new(SemaphoreState {
                permits,
                closed: false,
            }),
            cond: Condvar::new(),
            max,
        }
    }

    /// Takes one permit, blocking until one is available.
    pub(crate) fn acquire(&self) -> Result<(), AcquireError> {
        self.acquire_until(None)
    }

    /// Takes one permit, blocking at most until `deadline`.
    pub(crate) fn acquire_deadline(&self, deadline: Instant) -> Result<(), AcquireError> {
        self.acquire_until(Some(deadline))
    }

    /// Takes one permit if one is available right now.
    pub(crate) fn try_acquire(&self) -> Result<(), AcquireError> {
        let mut state = self.state.lock();
        if state.permits > 0 {
            state.permits -= 1;
            return Ok(());
        }
        if state.closed {
            return Err(AcquireError::Closed);
        }
        Err(AcquireError::NoPermits)
    }

    fn acquire_until(&self, deadline: Option<Instant>) -> Result<(), AcquireError> {
        let mut state = self.state.lock();
        loop {
            if state.permits > 0 {
                state.permits -= 1;
                return Ok(());
            }
            if state.closed {
                return Err(AcquireError::Closed);
            }
            match deadline {
                None => self.cond.wait(&mut state),
                Some(deadline) => {
                    // Re-check the count once more after a timeout: a release
                    // may have landed right at the deadline.
                    if self.cond.wait_until(&mut state, deadline).timed_out() {
                        if state.permits > 0 {
                            state.permits -= 1;
                            return Ok(());
                        }
                        if state.closed {
                            return Err(AcquireError::Closed);
                        }
                        return Err(AcquireError::Timeout);
                    }
                }
            }
        }
    }

    /// Returns one permit and wakes a waiter.
    pub(crate) fn release(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.permits < self.max, "semaphore released past its maximum");
        state.permits += 1;
        drop(state);
        self.cond.notify_one();
    }

    /// Closes the semaphore and wakes every waiter.
    pub(crate) fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        drop(state);
        self.cond.notify_all();
    }

    pub(crate) fn available_permits(&self) -> usize {
        self.state.lock().permits
    }

    #[cfg(test)]
    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}
