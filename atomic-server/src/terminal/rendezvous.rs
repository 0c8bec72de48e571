//! Single-slot hand-off between the reader task and a blocked capture
//!
//! At most one value is in flight. A submit that lands before the waiter
//! parks is kept in the slot, so the waiter never misses it. Closing is
//! sticky and wakes any waiter.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use atomic_utils::{AtomicError, Result};

#[derive(Debug)]
struct Slot<T> {
    value: Option<T>,
    closed: bool,
}

/// Synchronous rendezvous guarded by a mutex and condition variable
#[derive(Debug)]
pub struct Rendezvous<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

impl<T> Rendezvous<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                value: None,
                closed: false,
            }),
            ready: Condvar::new(),
        }
    }

    /// Hand a value to the waiter. Returns false once closed.
    pub fn submit(&self, value: T) -> bool {
        let mut slot = self.slot.lock();
        if slot.closed {
            return false;
        }
        slot.value = Some(value);
        self.ready.notify_one();
        true
    }

    /// Block until a value is submitted, the rendezvous closes, or the
    /// timeout elapses.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<T> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut slot = self.slot.lock();
        loop {
            if let Some(value) = slot.value.take() {
                return Ok(value);
            }
            if slot.closed {
                return Err(AtomicError::SessionClosed);
            }
            match deadline {
                Some(deadline) => {
                    if self.ready.wait_until(&mut slot, deadline).timed_out() {
                        if let Some(value) = slot.value.take() {
                            return Ok(value);
                        }
                        return Err(AtomicError::InputTimeout {
                            seconds: timeout.map(|t| t.as_secs()).unwrap_or_default(),
                        });
                    }
                }
                None => self.ready.wait(&mut slot),
            }
        }
    }

    /// Drop a value nobody collected
    pub fn discard(&self) {
        self.slot.lock().value = None;
    }

    /// Wake any waiter with `SessionClosed`; later waits fail immediately
    pub fn close(&self) {
        let mut slot = self.slot.lock();
        slot.closed = true;
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.slot.lock().closed
    }
}

impl<T> Default for Rendezvous<T> {
    fn default() -> Self {
        Self::new()
    }
}
