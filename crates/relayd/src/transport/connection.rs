//! Connection worker: reads frames, runs requests, and owns the writer.

use std::collections::HashSet;
use std::net::{Shutdown, TcpStream};
use std::sync::mpsc::SyncSender;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use super::codec::{Frame, FrameError, FrameReader};
use super::outbound::OutboundQueue;
use super::{ConnectionHandler, ConnectionId, LISTENER_TARGET};
use crate::cancel::CancellationToken;
use crate::dispatch::{Dispatcher, Notifier, RequestContext};
use crate::limiter::ConcurrencyLimiter;
use crate::protocol::{Outbound, Request, RequestId, Response, RpcError};
use crate::stats::ServerStats;

/// A writer blocked this long on a peer that stopped reading gives up and
/// closes the connection.
const WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings shared by every connection.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ConnectionSettings {
    pub(crate) max_frame_bytes: usize,
    /// Requests a connection may have admitted or waiting for admission. The
    /// reader stops pulling frames while the window is full. Also bounds the
    /// outbound queue.
    pub(crate) max_pending: usize,
    pub(crate) allow_push: bool,
}

/// Serves JSON-RPC over each accepted stream.
pub(crate) struct RpcConnectionHandler {
    dispatcher: Arc<Dispatcher>,
    stats: Arc<ServerStats>,
    token: CancellationToken,
    settings: ConnectionSettings,
}

impl RpcConnectionHandler {
    pub(crate) fn new(
        dispatcher: Arc<Dispatcher>,
        stats: Arc<ServerStats>,
        token: CancellationToken,
        settings: ConnectionSettings,
    ) -> Self {
        Self {
            dispatcher,
            stats,
            token,
            settings,
        }
    }
}

impl ConnectionHandler for RpcConnectionHandler {
    fn handle(&self, id: ConnectionId, stream: TcpStream) {
        let (sink, control) = match (stream.try_clone(), stream.try_clone()) {
            (Ok(sink), Ok(control)) => (sink, Arc::new(control)),
            (Err(error), _) | (_, Err(error)) => {
                warn!(
                    target: LISTENER_TARGET,
                    connection = id,
                    error = %error,
                    "failed to clone connection stream"
                );
                return;
            }
        };
        if let Err(error) = sink.set_write_timeout(Some(WRITE_TIMEOUT)) {
            debug!(
                target: LISTENER_TARGET,
                connection = id,
                error = %error,
                "failed to set write timeout"
            );
        }
        let closer = Arc::clone(&control);
        let spawned = OutboundQueue::spawn(id, sink, self.settings.max_pending, move || {
            close(&closer, id);
        });
        let (sender, writer) = match spawned {
            Ok(queue) => queue,
            Err(error) => {
                warn!(
                    target: LISTENER_TARGET,
                    connection = id,
                    error = %error,
                    "failed to start connection writer; dropping connection"
                );
                close(&control, id);
                return;
            }
        };

        let mut session = Session {
            id,
            token: self.token.child(),
            sender,
            pending: Arc::new(Mutex::new(HashSet::new())),
            window: ConcurrencyLimiter::new(self.settings.max_pending),
            requests: Vec::new(),
            dispatcher: Arc::clone(&self.dispatcher),
            stats: Arc::clone(&self.stats),
            allow_push: self.settings.allow_push,
        };
        debug!(target: LISTENER_TARGET, connection = id, "connection opened");

        let mut reader = FrameReader::new(stream, self.settings.max_frame_bytes);
        loop {
            match reader.next_frame() {
                Ok(Some(frame)) => session.accept(frame),
                Ok(None) => break,
                Err(FrameError::TooLarge { limit }) => {
                    warn!(
                        target: LISTENER_TARGET,
                        connection = id,
                        limit,
                        "frame exceeds limit; closing connection"
                    );
                    session.token.cancel();
                    break;
                }
                Err(error) => {
                    debug!(
                        target: LISTENER_TARGET,
                        connection = id,
                        error = %error,
                        "connection read failed"
                    );
                    session.token.cancel();
                    break;
                }
            }
        }

        session.finish();
        writer.join(id);
        close(&control, id);
        debug!(target: LISTENER_TARGET, connection = id, "connection closed");
    }
}

/// Shuts both directions so the peer sees the close even while the tracker
/// still holds a handle to the socket.
fn close(stream: &TcpStream, id: ConnectionId) {
    if let Err(error) = stream.shutdown(Shutdown::Both) {
        debug!(
            target: LISTENER_TARGET,
            connection = id,
            error = %error,
            "stream already closed"
        );
    }
}

struct Session {
    id: ConnectionId,
    token: CancellationToken,
    sender: SyncSender<Outbound>,
    pending: Arc<Mutex<HashSet<RequestId>>>,
    window: ConcurrencyLimiter,
    requests: Vec<JoinHandle<()>>,
    dispatcher: Arc<Dispatcher>,
    stats: Arc<ServerStats>,
    allow_push: bool,
}

impl Session {
    fn accept(&mut self, frame: Frame) {
        let request = match Request::from_frame(&frame.bytes) {
            Ok(request) => request,
            Err(rejection) => {
                debug!(
                    target: LISTENER_TARGET,
                    connection = self.id,
                    error = %rejection.error,
                    terminated = frame.terminated,
                    "rejected frame"
                );
                if frame.terminated {
                    self.send(rejection.into_response());
                }
                return;
            }
        };

        if let Some(id) = &request.id {
            let fresh = self
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(id.clone());
            if !fresh {
                self.send(Response::failure(
                    Some(id.clone()),
                    RpcError::invalid_request(format!("duplicate request id {id}")),
                ));
                return;
            }
        }

        // Blocks the reader while the window is full. A cancelled wait means
        // the connection is draining, so the request is answered inline and
        // the dispatcher refuses it without running the handler.
        let Ok(slot) = self.window.acquire(&self.token) else {
            self.task(request).run();
            return;
        };

        self.requests.retain(|request| !request.is_finished());
        let id = request.id.clone();
        let task = self.task(request);
        let spawned = thread::Builder::new()
            .name(format!("relay-conn-{}-request", self.id))
            .spawn(move || {
                task.run();
                drop(slot);
            });
        match spawned {
            Ok(handle) => self.requests.push(handle),
            Err(error) => {
                warn!(
                    target: LISTENER_TARGET,
                    connection = self.id,
                    error = %error,
                    "failed to start request thread"
                );
                if let Some(id) = id {
                    self.forget(&id);
                    self.send(Response::failure(
                        Some(id),
                        RpcError::internal("server could not start the request"),
                    ));
                }
            }
        }
    }

    fn task(&self, request: Request) -> RequestTask {
        let notifier = Notifier::new(self.sender.clone(), self.allow_push, Arc::clone(&self.stats));
        let context = RequestContext::new(self.id, request.id.clone(), self.token.clone(), notifier);
        RequestTask {
            request,
            context,
            dispatcher: Arc::clone(&self.dispatcher),
            pending: Arc::clone(&self.pending),
            sender: self.sender.clone(),
        }
    }

    fn forget(&self, id: &RequestId) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }

    fn send(&self, response: Response) {
        if self.sender.send(response.into()).is_err() {
            debug!(
                target: LISTENER_TARGET,
                connection = self.id,
                "connection closed before response was written"
            );
        }
    }

    /// Waits for every request thread, then releases this session's sender
    /// so the writer can drain and exit.
    fn finish(self) {
        for request in self.requests {
            if request.join().is_err() {
                warn!(
                    target: LISTENER_TARGET,
                    connection = self.id,
                    "request thread panicked"
                );
            }
        }
    }
}

/// One request bound to its connection, ready to run on any thread.
struct RequestTask {
    request: Request,
    context: RequestContext,
    dispatcher: Arc<Dispatcher>,
    pending: Arc<Mutex<HashSet<RequestId>>>,
    sender: SyncSender<Outbound>,
}

impl RequestTask {
    fn run(self) {
        let Self {
            request,
            context,
            dispatcher,
            pending,
            sender,
        } = self;
        let id = request.id.clone();
        let response = dispatcher.dispatch(request, &context);
        if let Some(id) = &id {
            pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(id);
        }
        if let Some(response) = response
            && sender.send(response.into()).is_err()
        {
            debug!(
                target: LISTENER_TARGET,
                connection = context.connection(),
                "connection closed before response was written"
            );
        }
    }
}
