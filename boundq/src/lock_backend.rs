//! Lock + condition-variable backend.

use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use crate::backend::Backend;
use crate::error::{Done, PopError, PushError};
use crate::ring::Ring;

/// Bounded FIFO guarded by a single lock and two broadcast condvars.
///
/// The lock covers the ring and the closed flag. Producers wait on
/// `not_full`, consumers on `not_empty`. Every state change wakes all
/// waiters of the affected class, and each waiter re-tests its predicate in
/// a loop before acting.
pub struct LockBackend<T> {
    state: Mutex<LockState<T>>,
    not_full: Condvar,
    not_empty: Condvar,
}

struct LockState<T> {
    ring: Ring<T>,
    closed: bool,
}

impl<T> LockBackend<T> {
    fn push_until(&self, item: T, deadline: Option<Instant>) -> Result<(), PushError<T>> {
        let mut state = self.state.lock();

        loop {
            if state.closed {
                return Err(PushError::Closed(item));
            }
            if !state.ring.is_full() {
                break;
            }
            match deadline {
                None => self.not_full.wait(&mut state),
                Some(deadline) => {
                    if self.not_full.wait_until(&mut state, deadline).timed_out() {
                        if state.closed {
                            return Err(PushError::Closed(item));
                        }
                        if state.ring.is_full() {
                            return Err(PushError::Timeout(item));
                        }
                        break;
                    }
                }
            }
        }

        state.ring.push_back(item);
        drop(state);
        self.not_empty.notify_all();
        Ok(())
    }

    fn pop_until(&self, deadline: Option<Instant>) -> Result<T, PopError> {
        let mut state = self.state.lock();

        loop {
            if let Some(item) = state.ring.pop_front() {
                drop(state);
                self.not_full.notify_all();
                return Ok(item);
            }
            if state.closed {
                return Err(PopError::Closed);
            }
            match deadline {
                None => self.not_empty.wait(&mut state),
                Some(deadline) => {
                    if self.not_empty.wait_until(&mut state, deadline).timed_out()
                        && state.ring.is_empty()
                    {
                        return Err(if state.closed {
                            PopError::Closed
                        } else {
                            PopError::Timeout
                        });
                    }
                }
            }
        }
    }
}

impl<T: Send> Backend<T> for LockBackend<T> {
    fn with_capacity(capacity: usize) -> Self {
        LockBackend {
            state: Mutex::new(LockState {
                ring: Ring::new(capacity),
                closed: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    fn push(&self, item: T) -> Result<(), PushError<T>> {
        self.push_until(item, None)
    }

    fn try_push(&self, item: T) -> Result<(), PushError<T>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(PushError::Closed(item));
        }
        if state.ring.is_full() {
            return Err(PushError::Full(item));
        }
        state.ring.push_back(item);
        drop(state);
        self.not_empty.notify_all();
        Ok(())
    }

    fn push_deadline(&self, item: T, deadline: Instant) -> Result<(), PushError<T>> {
        self.push_until(item, Some(deadline))
    }

    fn pop(&self) -> Result<T, Done> {
        // Without a deadline the only way out other than an item is close.
        self.pop_until(None).map_err(|_| Done)
    }

    fn try_pop(&self) -> Result<T, PopError> {
        let mut state = self.state.lock();
        if let Some(item) = state.ring.pop_front() {
            drop(state);
            self.not_full.notify_all();
            return Ok(item);
        }
        if state.closed {
            Err(PopError::Closed)
        } else {
            Err(PopError::Empty)
        }
    }

    fn pop_deadline(&self, deadline: Instant) -> Result<T, PopError> {
        self.pop_until(Some(deadline))
    }

    fn close(&self) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        state.closed = true;
        drop(state);
        self.not_empty.notify_all();
        self.not_full.notify_all();
        true
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn len(&self) -> usize {
        self.state.lock().ring.len()
    }

    fn capacity(&self) -> usize {
        self.state.lock().ring.capacity()
    }

    fn snapshot(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.state.lock().ring.to_vec()
    }
}
