//! Server lifecycle states and the reporter that surfaces them.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use super::LIFECYCLE_TARGET;
use crate::stats::StatsSnapshot;

/// Lifecycle of a started server. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    /// Accepting connections and admitting requests.
    Listening,
    /// No new connections; admitted requests are finishing.
    Draining,
    /// Every connection and request has finished.
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Listening => "listening",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        })
    }
}

/// Observer for lifecycle transitions.
pub trait LifecycleReporter: Send + Sync {
    /// The listener is bound and accepting.
    fn listening(&self, address: SocketAddr, methods: &[String]);

    /// Shutdown has been triggered.
    fn draining(&self);

    /// Shutdown finished; `stats` holds the final counters.
    fn stopped(&self, stats: &StatsSnapshot);
}

impl<T> LifecycleReporter for Arc<T>
where
    T: LifecycleReporter + ?Sized,
{
    fn listening(&self, address: SocketAddr, methods: &[String]) {
        (**self).listening(address, methods);
    }

    fn draining(&self) {
        (**self).draining();
    }

    fn stopped(&self, stats: &StatsSnapshot) {
        (**self).stopped(stats);
    }
}

/// Default reporter that records transitions using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredLifecycleReporter;

impl StructuredLifecycleReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl LifecycleReporter for StructuredLifecycleReporter {
    fn listening(&self, address: SocketAddr, methods: &[String]) {
        info!(
            target: LIFECYCLE_TARGET,
            event = "listening",
            address = %address,
            methods = ?methods,
            "Listening at {address}..."
        );
    }

    fn draining(&self) {
        info!(
            target: LIFECYCLE_TARGET,
            event = "draining",
            "Server shutting down..."
        );
    }

    fn stopped(&self, stats: &StatsSnapshot) {
        info!(
            target: LIFECYCLE_TARGET,
            event = "stopped",
            received = stats.received,
            completed = stats.completed,
            failed = stats.failed,
            cancelled = stats.cancelled,
            notifications = stats.notifications,
            connections = stats.connections,
            "Messages received = {}",
            stats.received
        );
        info!(
            target: LIFECYCLE_TARGET,
            event = "stopped",
            "Server gracefully stopped"
        );
    }
}
