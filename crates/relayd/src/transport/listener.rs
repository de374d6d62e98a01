//! TCP listener and accept loop.

use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use relay_config::ListenAddress;
use tracing::{debug, info, warn};

use super::{ConnectionHandler, ConnectionTracker, LISTENER_TARGET, ListenerError};
use crate::cancel::CancellationToken;
use crate::stats::ServerStats;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);

/// A bound TCP listener that has not started accepting yet.
#[derive(Debug)]
pub(crate) struct SocketListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

/// Collaborators the accept loop hands connections to.
pub(crate) struct AcceptContext {
    pub(crate) handler: Arc<dyn ConnectionHandler>,
    pub(crate) tracker: Arc<ConnectionTracker>,
    pub(crate) stats: Arc<ServerStats>,
    pub(crate) token: CancellationToken,
}

impl SocketListener {
    pub(crate) fn bind(address: &ListenAddress) -> Result<Self, ListenerError> {
        let listener = bind_tcp(address.host(), address.port())?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ListenerError::LocalAddr { source })?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Starts the accept loop on a background thread.
    ///
    /// The loop polls the token between accepts and drops the listener as
    /// soon as it fires, so no connection is accepted after cancellation.
    pub(crate) fn start(self, context: AcceptContext) -> Result<ListenerHandle, ListenerError> {
        self.listener
            .set_nonblocking(true)
            .map_err(|source| ListenerError::NonBlocking { source })?;
        let handle = thread::Builder::new()
            .name("relay-accept".to_owned())
            .spawn(move || run_accept_loop(self, &context))
            .map_err(|source| ListenerError::Spawn { source })?;
        Ok(ListenerHandle {
            handle: Some(handle),
        })
    }
}

/// Handle to the background accept thread.
#[derive(Debug)]
pub(crate) struct ListenerHandle {
    handle: Option<thread::JoinHandle<()>>,
}

impl ListenerHandle {
    /// Waits for the accept loop to exit. The listener socket is closed once
    /// this returns.
    pub(crate) fn join(mut self) -> Result<(), ListenerError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| ListenerError::ThreadPanic),
            None => Ok(()),
        }
    }
}

fn run_accept_loop(listener: SocketListener, context: &AcceptContext) {
    info!(
        target: LISTENER_TARGET,
        address = %listener.local_addr,
        "listener active"
    );
    let mut last_error = None::<io::ErrorKind>;
    while !context.token.is_cancelled() {
        match listener.listener.accept() {
            Ok((stream, peer)) => {
                last_error = None;
                if let Err(error) = stream.set_nonblocking(false) {
                    warn!(
                        target: LISTENER_TARGET,
                        peer = %peer,
                        error = %error,
                        "failed to configure accepted stream"
                    );
                    continue;
                }
                context.stats.record_connection();
                debug!(target: LISTENER_TARGET, peer = %peer, "connection accepted");
                context.tracker.spawn(stream, &context.handler);
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_BACKOFF);
            }
            Err(error) => {
                let kind = error.kind();
                if last_error != Some(kind) {
                    warn!(
                        target: LISTENER_TARGET,
                        error = %error,
                        "socket accept error"
                    );
                }
                last_error = Some(kind);
                thread::sleep(ERROR_BACKOFF);
            }
        }
    }
    info!(
        target: LISTENER_TARGET,
        address = %listener.local_addr,
        "listener closed"
    );
}

fn bind_tcp(host: &str, port: u16) -> Result<TcpListener, ListenerError> {
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| ListenerError::Resolve {
            host: host.to_owned(),
            port,
            source,
        })?;
    let addr = addrs.next().ok_or_else(|| ListenerError::ResolveEmpty {
        host: host.to_owned(),
        port,
    })?;
    TcpListener::bind(addr).map_err(|source| ListenerError::BindTcp { addr, source })
}
