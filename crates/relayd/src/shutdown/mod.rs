//! Graceful shutdown: lifecycle states, reporting, and signal handling.

mod lifecycle;
mod signal;

pub use lifecycle::{LifecycleReporter, LifecycleState, StructuredLifecycleReporter};
pub use signal::{ShutdownError, ShutdownSignal, SystemShutdownSignal};

pub(crate) const SHUTDOWN_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::shutdown");
pub(crate) const LIFECYCLE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::lifecycle");
