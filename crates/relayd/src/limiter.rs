//! Global admission gate bounding how many requests execute at once.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::cancel::CancellationToken;

/// Admission was refused because the token fired before a slot was granted.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("admission cancelled")]
pub struct Cancelled;

#[derive(Debug)]
struct Slots {
    available: usize,
}

#[derive(Debug)]
struct Shared {
    capacity: usize,
    slots: Mutex<Slots>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Counting gate shared by every connection.
///
/// The bound is global: a burst on one connection can hold every slot while
/// requests on other connections wait.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    shared: Arc<Shared>,
}

impl ConcurrencyLimiter {
    /// Creates a limiter admitting at most `capacity` concurrent holders.
    ///
    /// A capacity of zero is raised to one so the server can make progress.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            shared: Arc::new(Shared {
                capacity,
                slots: Mutex::new(Slots {
                    available: capacity,
                }),
                changed: Condvar::new(),
            }),
        }
    }

    /// Blocks until a slot is free, then returns a permit holding it.
    ///
    /// A token that is already cancelled fails immediately, even when slots
    /// are free, so no request starts once draining has begun.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] when `token` fires before a slot is granted.
    pub fn acquire(&self, token: &CancellationToken) -> Result<Permit, Cancelled> {
        let waker = Arc::clone(&self.shared);
        let _registration = token.on_cancel(move || {
            // Taking the lock orders the wake-up after any waiter that has
            // checked the token but not yet parked.
            let _slots = waker.lock();
            waker.changed.notify_all();
        });

        let mut slots = self.shared.lock();
        loop {
            if token.is_cancelled() {
                return Err(Cancelled);
            }
            if slots.available > 0 {
                slots.available -= 1;
                return Ok(Permit {
                    shared: Arc::clone(&self.shared),
                });
            }
            slots = self
                .shared
                .changed
                .wait(slots)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Maximum number of concurrent permits.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Number of permits currently held.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.shared.capacity - self.shared.lock().available
    }

    /// Blocks until every permit has been released.
    pub fn wait_idle(&self) {
        let mut slots = self.shared.lock();
        while slots.available < self.shared.capacity {
            slots = self
                .shared
                .changed
                .wait(slots)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// A held slot. Dropping the permit releases it.
#[derive(Debug)]
#[must_use = "dropping the permit releases the slot immediately"]
pub struct Permit {
    shared: Arc<Shared>,
}

impl Permit {
    /// Returns the slot to the limiter.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        let mut slots = self.shared.lock();
        slots.available += 1;
        drop(slots);
        self.shared.changed.notify_all();
    }
}
