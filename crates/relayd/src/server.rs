//! Server assembly and the graceful shutdown sequence.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use relay_config::Config;
use thiserror::Error;
use tracing::debug;

use crate::cancel::CancellationToken;
use crate::dispatch::{Dispatcher, MethodRegistry};
use crate::limiter::ConcurrencyLimiter;
use crate::shutdown::{LifecycleReporter, LifecycleState};
use crate::stats::{ServerStats, StatsSnapshot};
use crate::transport::{
    AcceptContext, ConnectionSettings, ConnectionTracker, ListenerError, ListenerHandle,
    RpcConnectionHandler, SocketListener,
};

const SERVER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::server");

/// Errors raised while starting or stopping the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener failed to bind, start, or join.
    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// Final state reported once the server has stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Counters at the moment the server stopped.
    pub stats: StatsSnapshot,
}

/// A bound server that has not started accepting yet.
#[derive(Debug)]
pub struct Server {
    listener: SocketListener,
    registry: Arc<MethodRegistry>,
    max_in_flight: usize,
    settings: ConnectionSettings,
}

impl Server {
    /// Binds the listener described by `config`. The registry is frozen from
    /// here on.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Listener`] when the address cannot be resolved
    /// or bound.
    pub fn bind(config: &Config, registry: MethodRegistry) -> Result<Self, ServerError> {
        let listener = SocketListener::bind(config.address())?;
        Ok(Self {
            listener,
            registry: Arc::new(registry),
            max_in_flight: config.max_in_flight(),
            settings: ConnectionSettings {
                max_frame_bytes: config.max_frame_bytes(),
                max_pending: config.max_pending(),
                allow_push: config.allow_push(),
            },
        })
    }

    /// Address the listener is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    /// Starts accepting connections.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Listener`] when the accept loop cannot start.
    pub fn start(self, reporter: Arc<dyn LifecycleReporter>) -> Result<ServerHandle, ServerError> {
        let local_addr = self.listener.local_addr();
        let token = CancellationToken::new();
        let stats = Arc::new(ServerStats::new());
        let limiter = ConcurrencyLimiter::new(self.max_in_flight);
        let tracker = Arc::new(ConnectionTracker::new());
        let methods = self.registry.methods();
        let dispatcher = Arc::new(Dispatcher::new(
            self.registry,
            limiter.clone(),
            Arc::clone(&stats),
        ));
        let handler = Arc::new(RpcConnectionHandler::new(
            dispatcher,
            Arc::clone(&stats),
            token.clone(),
            self.settings,
        ));

        let listener = self.listener.start(AcceptContext {
            handler,
            tracker: Arc::clone(&tracker),
            stats: Arc::clone(&stats),
            token: token.clone(),
        })?;
        reporter.listening(local_addr, &methods);

        Ok(ServerHandle {
            local_addr,
            token,
            state: Mutex::new(LifecycleState::Listening),
            listener: Some(listener),
            tracker,
            limiter,
            stats,
            reporter,
        })
    }
}

/// Controls a running server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    token: CancellationToken,
    state: Mutex<LifecycleState>,
    listener: Option<ListenerHandle>,
    tracker: Arc<ConnectionTracker>,
    limiter: ConcurrencyLimiter,
    stats: Arc<ServerStats>,
    reporter: Arc<dyn LifecycleReporter>,
}

impl ServerHandle {
    /// Address the listener is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Requests in flight right now.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.limiter.in_flight()
    }

    /// Connection workers that have not finished yet.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.tracker.active()
    }

    /// Starts draining: stops accepting and refuses new admissions. Requests
    /// already admitted keep running. Idempotent; returns `true` only for the
    /// call that started draining.
    pub fn trigger(&self) -> bool {
        if !self.token.cancel() {
            return false;
        }
        self.advance(LifecycleState::Draining);
        self.reporter.draining();
        true
    }

    /// Drains the server and waits until it has stopped.
    ///
    /// Triggers draining if that has not happened yet, waits for the accept
    /// loop to release the listener, waits for admitted requests to finish,
    /// then closes every connection's read side and joins its worker so all
    /// produced responses are written.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Listener`] when the accept thread panicked.
    /// Connections are still drained in that case.
    pub fn shutdown(mut self) -> Result<ShutdownReport, ServerError> {
        self.trigger();
        let listener = self
            .listener
            .take()
            .map_or(Ok(()), ListenerHandle::join);
        debug!(target: SERVER_TARGET, "listener released; waiting for admitted requests");

        self.limiter.wait_idle();
        self.tracker.close_all();
        self.advance(LifecycleState::Stopped);

        let report = ShutdownReport {
            stats: self.stats.snapshot(),
        };
        self.reporter.stopped(&report.stats);
        listener?;
        Ok(report)
    }

    fn advance(&self, next: LifecycleState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if next > *state {
            *state = next;
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
