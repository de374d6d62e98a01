//! TCP transport: listener, framing, and per-connection workers.
//!
//! The listener accepts connections on a background thread and hands each
//! one to a worker thread. A worker reads newline-delimited frames, runs
//! every request on its own thread, and funnels all output through a single
//! writer.

mod codec;
mod connection;
mod errors;
mod listener;
mod outbound;
mod tracker;

use std::net::TcpStream;

pub use self::codec::{Frame, FrameError, FrameReader, FrameWriter};
pub(crate) use self::connection::{ConnectionSettings, RpcConnectionHandler};
pub use self::errors::ListenerError;
pub(crate) use self::listener::{AcceptContext, ListenerHandle, SocketListener};
pub use self::outbound::ConnectionId;
pub(crate) use self::tracker::ConnectionTracker;

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");

/// Handles accepted connections.
pub(crate) trait ConnectionHandler: Send + Sync + 'static {
    /// Serves one connection until it closes. Implementations should avoid
    /// panicking.
    fn handle(&self, id: ConnectionId, stream: TcpStream);
}
