//! Line-delimited JSON-RPC 2.0 server with bounded concurrency.
//!
//! The server accepts TCP connections and reads one JSON-RPC envelope per
//! line. Each request is routed by its `Namespace.name` method to a handler
//! registered in a [`MethodRegistry`], waits for a slot on a global
//! [`ConcurrencyLimiter`], and runs on its own thread so a connection can
//! pipeline requests. Handlers may push notifications to their caller; these
//! are written before the response of the request that pushed them.
//!
//! Shutdown is cooperative. Triggering it stops the accept loop and refuses
//! new admissions with a cancelled error, while requests already admitted
//! run to completion and their responses are delivered before the server
//! reports itself stopped.
//!
//! The `relayd` binary wires this together with layered configuration from
//! [`relay_config`], structured `tracing` output, and `SIGINT`/`SIGTERM`
//! handling.

pub mod cancel;
pub mod dispatch;
pub mod limiter;
mod process;
pub mod protocol;
mod server;
pub mod services;
pub mod shutdown;
pub mod stats;
mod telemetry;
pub mod transport;

pub use cancel::CancellationToken;
pub use dispatch::{
    Dispatcher, Handler, HandlerError, MethodName, MethodRegistry, NotifyError, RegistryError,
    RequestContext, typed,
};
pub use limiter::{Cancelled, ConcurrencyLimiter, Permit};
pub use process::{
    ConfigLoader, LaunchError, StaticConfigLoader, SystemConfigLoader, run, run_server,
    run_server_with,
};
pub use server::{Server, ServerError, ServerHandle, ShutdownReport};
pub use shutdown::{
    LifecycleReporter, LifecycleState, ShutdownError, ShutdownSignal, StructuredLifecycleReporter,
    SystemShutdownSignal,
};
pub use stats::{ServerStats, StatsSnapshot};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
