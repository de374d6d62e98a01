//! One-way cancellation tokens shared across threads.
//!
//! A [`CancellationToken`] starts live and can be cancelled exactly once;
//! further calls to [`CancellationToken::cancel`] are no-ops. Blocking
//! primitives register a wake-up callback with [`CancellationToken::on_cancel`]
//! so they can abandon their wait as soon as the token fires. Child tokens are
//! cancelled together with their parent but can also be cancelled on their own.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

type Callback = Box<dyn FnOnce() + Send>;

struct Inner {
    cancelled: AtomicBool,
    next_id: AtomicU64,
    callbacks: Mutex<HashMap<u64, Callback>>,
    parent: Option<(Weak<Inner>, u64)>,
}

impl Inner {
    fn new(parent: Option<(Weak<Inner>, u64)>) -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            next_id: AtomicU64::new(0),
            callbacks: Mutex::new(HashMap::new()),
            parent,
        }
    }

    fn cancel(&self) -> bool {
        let callbacks = {
            let mut callbacks = self
                .callbacks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if self.cancelled.swap(true, Ordering::SeqCst) {
                return false;
            }
            std::mem::take(&mut *callbacks)
        };
        for (_, callback) in callbacks {
            callback();
        }
        true
    }

    fn register(&self, callback: Callback) -> Option<u64> {
        let mut callbacks = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.cancelled.load(Ordering::SeqCst) {
            drop(callbacks);
            callback();
            return None;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        callbacks.insert(id, callback);
        Some(id)
    }

    fn unregister(&self, id: u64) {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some((parent, id)) = self.parent.take()
            && let Some(parent) = parent.upgrade()
        {
            parent.unregister(id);
        }
    }
}

/// Cloneable handle to a shared cancellation flag.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    /// Creates a live token with no parent.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::new(None)),
        }
    }

    /// Creates a token that is cancelled when `self` is cancelled.
    ///
    /// Cancelling the child does not affect the parent. The parent forgets
    /// the child once every clone of the child has been dropped.
    #[must_use]
    pub fn child(&self) -> Self {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let child = Arc::new(Inner::new(Some((Arc::downgrade(&self.inner), id))));
        let weak_child = Arc::downgrade(&child);
        let callback: Callback = Box::new(move || {
            if let Some(child) = weak_child.upgrade() {
                child.cancel();
            }
        });

        let mut callbacks = self
            .inner
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.inner.cancelled.load(Ordering::SeqCst) {
            drop(callbacks);
            child.cancel();
        } else {
            callbacks.insert(id, callback);
        }
        Self { inner: child }
    }

    /// Triggers the token. Returns `true` only for the call that flipped it.
    pub fn cancel(&self) -> bool {
        self.inner.cancel()
    }

    /// Whether the token (or an ancestor) has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Runs `callback` once when the token is cancelled.
    ///
    /// If the token is already cancelled the callback runs immediately on the
    /// calling thread. Dropping the returned guard before cancellation
    /// unregisters the callback. Callbacks run on the cancelling thread and
    /// must not block.
    pub fn on_cancel<F>(&self, callback: F) -> CancelRegistration
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.inner.register(Box::new(callback));
        CancelRegistration {
            token: Arc::downgrade(&self.inner),
            id,
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Guard returned by [`CancellationToken::on_cancel`].
#[must_use = "dropping the registration unregisters the callback"]
pub struct CancelRegistration {
    token: Weak<Inner>,
    id: Option<u64>,
}

impl Drop for CancelRegistration {
    fn drop(&mut self) {
        if let Some(id) = self.id
            && let Some(token) = self.token.upgrade()
        {
            token.unregister(id);
        }
    }
}
