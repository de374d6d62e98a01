//! Per-request context handed to handlers.

use std::sync::Arc;
use std::sync::mpsc::SyncSender;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use super::DISPATCH_TARGET;
use crate::cancel::CancellationToken;
use crate::protocol::{Notification, Outbound, RequestId};
use crate::stats::ServerStats;
use crate::transport::ConnectionId;

/// Reasons a push notification could not be queued.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The server was configured without push support.
    #[error("push notifications are disabled")]
    PushDisabled,
    /// The parameters could not be serialised.
    #[error("failed to encode notification parameters: {0}")]
    Encode(#[from] serde_json::Error),
    /// The connection's writer has stopped.
    #[error("connection closed")]
    Closed,
}

/// Queues notifications on the caller's connection.
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: SyncSender<Outbound>,
    allow_push: bool,
    stats: Arc<ServerStats>,
}

impl Notifier {
    pub(crate) fn new(
        sender: SyncSender<Outbound>,
        allow_push: bool,
        stats: Arc<ServerStats>,
    ) -> Self {
        Self {
            sender,
            allow_push,
            stats,
        }
    }

    fn push<P: Serialize>(&self, method: &str, params: &P) -> Result<(), NotifyError> {
        if !self.allow_push {
            return Err(NotifyError::PushDisabled);
        }
        let params = serde_json::to_value(params)?;
        self.sender
            .send(Notification::new(method, Some(params)).into())
            .map_err(|_| NotifyError::Closed)?;
        self.stats.record_notification();
        Ok(())
    }
}

/// What a handler knows about the request it is serving.
#[derive(Debug, Clone)]
pub struct RequestContext {
    connection: ConnectionId,
    id: Option<RequestId>,
    token: CancellationToken,
    notifier: Notifier,
}

impl RequestContext {
    pub(crate) fn new(
        connection: ConnectionId,
        id: Option<RequestId>,
        token: CancellationToken,
        notifier: Notifier,
    ) -> Self {
        Self {
            connection,
            id,
            token,
            notifier,
        }
    }

    /// Connection the request arrived on.
    #[must_use]
    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Identifier of the request, absent for fire-and-forget calls.
    #[must_use]
    pub fn request_id(&self) -> Option<&RequestId> {
        self.id.as_ref()
    }

    /// The connection's cancellation token. Cancelled once the server starts
    /// draining or the connection fails.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Pushes a notification to the caller's connection.
    ///
    /// The notification is queued before the handler returns, so it reaches
    /// the peer ahead of this request's response.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] when pushes are disabled, the parameters do
    /// not serialise, or the connection is closed.
    pub fn notify<P: Serialize>(&self, method: &str, params: &P) -> Result<(), NotifyError> {
        let outcome = self.notifier.push(method, params);
        if let Err(error) = &outcome {
            debug!(
                target: DISPATCH_TARGET,
                connection = self.connection,
                method,
                error = %error,
                "notification not delivered"
            );
        }
        outcome
    }
}
