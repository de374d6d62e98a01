//! Process-wide request counters.
//!
//! Counters are plain atomics so connection workers never serialise on a
//! lock to record an outcome.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// How a dispatched request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The handler returned a result.
    Succeeded,
    /// The request ended with an error response (or would have, for a
    /// fire-and-forget call).
    Failed,
    /// Admission was refused because shutdown had begun.
    Cancelled,
}

/// Live counters owned by the server.
#[derive(Debug, Default)]
pub struct ServerStats {
    received: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    notifications: AtomicU64,
    connections: AtomicU64,
}

impl ServerStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a request envelope that was accepted for dispatch.
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a request reaching its terminal state.
    pub fn record_outcome(&self, outcome: Outcome) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        match outcome {
            Outcome::Succeeded => {}
            Outcome::Failed => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::Cancelled => {
                self.cancelled.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Records a pushed notification.
    pub fn record_notification(&self) {
        self.notifications.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an accepted connection.
    pub fn record_connection(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Copies the current values.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            notifications: self.notifications.load(Ordering::Relaxed),
            connections: self.connections.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ServerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Request envelopes accepted for dispatch.
    pub received: u64,
    /// Requests that reached a terminal state.
    pub completed: u64,
    /// Terminal requests that ended in an error.
    pub failed: u64,
    /// Terminal requests refused during draining.
    pub cancelled: u64,
    /// Notifications pushed by handlers.
    pub notifications: u64,
    /// Connections accepted.
    pub connections: u64,
}
