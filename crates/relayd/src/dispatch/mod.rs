//! Request routing from method names to handlers.
//!
//! The [`MethodRegistry`] is built before the server starts and shared
//! read-only afterwards. The [`Dispatcher`] resolves each request, waits for
//! a slot on the global limiter and runs the handler with a
//! [`RequestContext`] through which it may push notifications to its caller.

mod context;
mod dispatcher;
mod handler;
mod registry;

pub use context::{NotifyError, Notifier, RequestContext};
pub use dispatcher::Dispatcher;
pub use handler::{Handler, HandlerError, TypedHandler, typed};
pub use registry::{MethodName, MethodRegistry, RegistryError};

pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
