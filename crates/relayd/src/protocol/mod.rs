//! JSON-RPC 2.0 envelopes exchanged over a connection.
//!
//! Each line on the wire holds one envelope. Incoming requests may omit the
//! `jsonrpc` marker; every outgoing message carries it.

mod error;
mod message;

pub use error::{ErrorCode, RpcError};
pub use message::{
    Notification, Outbound, Payload, Rejection, Request, RequestId, Response, Version,
};
