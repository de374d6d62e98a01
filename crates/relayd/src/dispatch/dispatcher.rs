//! Resolution, admission and invocation of a single request.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, warn};

use super::{DISPATCH_TARGET, MethodName, MethodRegistry, RequestContext};
use crate::limiter::ConcurrencyLimiter;
use crate::protocol::{ErrorCode, Request, Response, RpcError};
use crate::stats::{Outcome, ServerStats};

/// Turns requests into responses under the global concurrency bound.
#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<MethodRegistry>,
    limiter: ConcurrencyLimiter,
    stats: Arc<ServerStats>,
}

impl Dispatcher {
    /// Builds a dispatcher over a frozen registry.
    #[must_use]
    pub fn new(
        registry: Arc<MethodRegistry>,
        limiter: ConcurrencyLimiter,
        stats: Arc<ServerStats>,
    ) -> Self {
        Self {
            registry,
            limiter,
            stats,
        }
    }

    /// Runs `request` to completion on the calling thread.
    ///
    /// Unknown methods are answered without taking a slot. Admission waits
    /// on the limiter and fails with a cancelled error once the context's
    /// token has fired. The slot is released before the response is built.
    /// Returns `None` for fire-and-forget requests.
    pub fn dispatch(&self, request: Request, context: &RequestContext) -> Option<Response> {
        self.stats.record_received();
        let Request { id, method, params } = request;
        let outcome = self.execute(&method, params, context);

        match &outcome {
            Ok(_) => self.stats.record_outcome(Outcome::Succeeded),
            Err(failure) if failure.kind() == Some(ErrorCode::Cancelled) => {
                self.stats.record_outcome(Outcome::Cancelled);
            }
            Err(failure) => {
                self.stats.record_outcome(Outcome::Failed);
                debug!(
                    target: DISPATCH_TARGET,
                    connection = context.connection(),
                    method = %method,
                    code = failure.code,
                    message = %failure.message,
                    "request failed"
                );
            }
        }

        if id.is_none() {
            return None;
        }
        Some(Response::new(id, outcome))
    }

    fn execute(
        &self,
        method: &str,
        params: Option<Value>,
        context: &RequestContext,
    ) -> Result<Value, RpcError> {
        let handler = MethodName::parse(method)
            .and_then(|name| self.registry.resolve(&name))
            .ok_or_else(|| RpcError::method_not_found(method))?;

        let Ok(permit) = self.limiter.acquire(context.token()) else {
            debug!(
                target: DISPATCH_TARGET,
                connection = context.connection(),
                method,
                "admission cancelled"
            );
            return Err(RpcError::cancelled());
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.call(context, params)));
        permit.release();

        match outcome {
            Ok(result) => result,
            Err(payload) => {
                let reason = panic_message(&*payload);
                error!(
                    target: DISPATCH_TARGET,
                    connection = context.connection(),
                    method,
                    reason = %reason,
                    "handler panicked"
                );
                Err(RpcError::internal(format!("handler panicked: {reason}")))
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        warn!(target: DISPATCH_TARGET, "handler panicked with a non-string payload");
        "unknown panic".to_owned()
    }
}
