//! Handler trait and the typed adapter built on serde.

use std::fmt;
use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::RequestContext;
use crate::protocol::RpcError;

/// Error returned by a handler. The code is preserved in the response.
pub type HandlerError = RpcError;

/// A registered method implementation.
///
/// Handlers run on a dedicated request thread while holding a concurrency
/// slot, so they may block. A panic is caught and reported as an internal
/// error.
pub trait Handler: Send + Sync + 'static {
    /// Invokes the method with its raw parameters.
    fn call(&self, context: &RequestContext, params: Option<Value>) -> Result<Value, HandlerError>;
}

impl<F> Handler for F
where
    F: Fn(&RequestContext, Option<Value>) -> Result<Value, HandlerError> + Send + Sync + 'static,
{
    fn call(&self, context: &RequestContext, params: Option<Value>) -> Result<Value, HandlerError> {
        self(context, params)
    }
}

/// Adapter that decodes parameters into `P` and encodes results from `R`.
pub struct TypedHandler<P, R, F> {
    function: F,
    marker: PhantomData<fn(P) -> R>,
}

/// Wraps a typed function as a [`Handler`].
///
/// Absent or `null` parameters decode as `P::default()`. Parameters that do
/// not decode into `P` yield an invalid-params error; a result that does not
/// encode yields an internal error.
pub fn typed<P, R, F>(function: F) -> TypedHandler<P, R, F>
where
    P: DeserializeOwned + Default + 'static,
    R: Serialize + 'static,
    F: Fn(&RequestContext, P) -> Result<R, HandlerError> + Send + Sync + 'static,
{
    TypedHandler {
        function,
        marker: PhantomData,
    }
}

impl<P, R, F> Handler for TypedHandler<P, R, F>
where
    P: DeserializeOwned + Default + 'static,
    R: Serialize + 'static,
    F: Fn(&RequestContext, P) -> Result<R, HandlerError> + Send + Sync + 'static,
{
    fn call(&self, context: &RequestContext, params: Option<Value>) -> Result<Value, HandlerError> {
        let decoded = match params {
            None | Some(Value::Null) => P::default(),
            Some(raw) => serde_json::from_value(raw)
                .map_err(|error| RpcError::invalid_params(format!("invalid parameters: {error}")))?,
        };
        let result = (self.function)(context, decoded)?;
        serde_json::to_value(result)
            .map_err(|error| RpcError::internal(format!("failed to encode result: {error}")))
    }
}

impl<P, R, F> fmt::Debug for TypedHandler<P, R, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedHandler")
            .field("params", &std::any::type_name::<P>())
            .field("result", &std::any::type_name::<R>())
            .finish()
    }
}
