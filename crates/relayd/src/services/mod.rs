//! Methods exposed by the server.

mod post;
mod status;
mod string_operations;

use std::sync::Arc;

pub use post::{Alert, AlertParams, AlertSink, TracingAlertSink};
pub use status::{PUSHBACK, status};
pub use string_operations::count_string;

use crate::dispatch::{MethodRegistry, RegistryError, RequestContext, typed};

/// Registers every built-in method.
///
/// # Errors
///
/// Returns [`RegistryError`] if any method is already present in `registry`.
pub fn register_all(
    registry: &mut MethodRegistry,
    alerts: Arc<dyn AlertSink>,
) -> Result<(), RegistryError> {
    registry.register("StringOperations", "CountString", typed(count_string))?;
    let alert = Alert::new(alerts);
    registry.register(
        "Post",
        "Alert",
        typed(move |context: &RequestContext, params: AlertParams| alert.call(context, params)),
    )?;
    registry.register("Server", "Status", typed(status))?;
    Ok(())
}

/// Registry holding the built-in methods with alerts sent to `tracing`.
///
/// # Errors
///
/// Returns [`RegistryError`] only if the built-in names collide.
pub fn default_registry() -> Result<MethodRegistry, RegistryError> {
    let mut registry = MethodRegistry::new();
    register_all(&mut registry, Arc::new(TracingAlertSink))?;
    Ok(registry)
}
