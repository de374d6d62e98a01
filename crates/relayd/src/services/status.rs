//! `Server` namespace.

use serde_json::json;

use crate::dispatch::{HandlerError, RequestContext};

/// Notification pushed by `Server.Status` before it replies.
pub const PUSHBACK: &str = "pushback";

/// Greets the caller with a `pushback` notification, then reports `"OK"`.
///
/// # Errors
///
/// Returns an internal error carrying `"BAD"` as data when the notification
/// cannot be queued.
pub fn status(context: &RequestContext, (): ()) -> Result<&'static str, HandlerError> {
    context
        .notify(PUSHBACK, &["hello, friend"])
        .map_err(|error| {
            HandlerError::internal(format!("push failed: {error}")).with_data(json!("BAD"))
        })?;
    Ok("OK")
}
