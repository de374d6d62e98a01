//! Request, response and notification envelopes.

use std::fmt;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::RpcError;

const VERSION: &str = "2.0";

/// The `"jsonrpc":"2.0"` marker written on every outgoing message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Version;

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(VERSION)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw == VERSION {
            Ok(Self)
        } else {
            Err(de::Error::invalid_value(
                de::Unexpected::Str(&raw),
                &"protocol version 2.0",
            ))
        }
    }
}

/// Request identifier: a JSON string or number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric identifier, preserved exactly as received.
    Number(serde_json::Number),
    /// String identifier.
    String(String),
}

impl RequestId {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(number) => Some(Self::Number(number.clone())),
            Value::String(text) => Some(Self::String(text.clone())),
            _ => None,
        }
    }
}

impl From<u64> for RequestId {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(number) => write!(f, "{number}"),
            Self::String(text) => write!(f, "\"{text}\""),
        }
    }
}

/// A decoded request. Requests without an identifier are fire-and-forget.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Identifier echoed in the response.
    pub id: Option<RequestId>,
    /// Method name in `Namespace.name` form.
    pub method: String,
    /// Opaque parameter payload.
    pub params: Option<Value>,
}

/// A frame that could not be accepted as a request.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    /// Identifier recovered from the frame, if any.
    pub id: Option<RequestId>,
    /// Error to report.
    pub error: RpcError,
}

impl Rejection {
    fn new(id: Option<RequestId>, message: impl Into<String>) -> Self {
        Self {
            id,
            error: RpcError::parse_error(message),
        }
    }

    /// Converts the rejection into the error response sent to the peer.
    #[must_use]
    pub fn into_response(self) -> Response {
        Response::failure(self.id, self.error)
    }
}

impl Request {
    /// Decodes one frame.
    ///
    /// Decoding is done over a generic JSON value so the identifier can be
    /// echoed back even when the rest of the envelope is unusable.
    ///
    /// # Errors
    ///
    /// Returns a [`Rejection`] carrying a parse error when the frame is not
    /// JSON, is not an object, declares a version other than `2.0`, has an
    /// identifier that is neither string nor number, or lacks a string
    /// method name.
    pub fn from_frame(frame: &[u8]) -> Result<Self, Rejection> {
        let value: Value = serde_json::from_slice(frame)
            .map_err(|error| Rejection::new(None, format!("invalid JSON: {error}")))?;
        let Value::Object(mut envelope) = value else {
            return Err(Rejection::new(None, "request must be a JSON object"));
        };

        let id = take_id(&mut envelope)?;
        if let Some(version) = envelope.remove("jsonrpc")
            && version.as_str() != Some(VERSION)
        {
            return Err(Rejection::new(id, "unsupported protocol version"));
        }
        let method = match envelope.remove("method") {
            Some(Value::String(method)) => method,
            Some(_) => return Err(Rejection::new(id, "method must be a string")),
            None => return Err(Rejection::new(id, "missing method name")),
        };
        let params = envelope.remove("params");

        Ok(Self { id, method, params })
    }

    /// Whether the caller expects a response.
    #[must_use]
    pub fn expects_response(&self) -> bool {
        self.id.is_some()
    }
}

fn take_id(envelope: &mut Map<String, Value>) -> Result<Option<RequestId>, Rejection> {
    match envelope.remove("id") {
        None => Ok(None),
        Some(value) => RequestId::from_value(&value)
            .map(Some)
            .ok_or_else(|| Rejection::new(None, "id must be a string or number")),
    }
}

/// Result or error; a response carries exactly one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Payload {
    /// Successful result.
    Result(Value),
    /// Error descriptor.
    Error(RpcError),
}

/// Reply to a request with an identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    jsonrpc: Version,
    /// Echoed identifier; `null` when it could not be recovered.
    pub id: Option<RequestId>,
    /// Result or error.
    #[serde(flatten)]
    pub payload: Payload,
}

impl Response {
    /// Builds a response from a handler outcome.
    #[must_use]
    pub fn new(id: Option<RequestId>, outcome: Result<Value, RpcError>) -> Self {
        let payload = match outcome {
            Ok(value) => Payload::Result(value),
            Err(error) => Payload::Error(error),
        };
        Self {
            jsonrpc: Version,
            id,
            payload,
        }
    }

    /// Builds an error response.
    #[must_use]
    pub fn failure(id: Option<RequestId>, error: RpcError) -> Self {
        Self::new(id, Err(error))
    }

    /// The error, if this is an error response.
    #[must_use]
    pub fn error(&self) -> Option<&RpcError> {
        match &self.payload {
            Payload::Error(error) => Some(error),
            Payload::Result(_) => None,
        }
    }
}

/// Server-initiated message with no identifier and no reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    jsonrpc: Version,
    /// Notification name.
    pub method: String,
    /// Optional parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Notification {
    /// Builds a notification.
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: Version,
            method: method.into(),
            params,
        }
    }
}

/// Anything written to a connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outbound {
    /// Reply to a request.
    Response(Response),
    /// Pushed notification.
    Notification(Notification),
}

impl From<Response> for Outbound {
    fn from(response: Response) -> Self {
        Self::Response(response)
    }
}

impl From<Notification> for Outbound {
    fn from(notification: Notification) -> Self {
        Self::Notification(notification)
    }
}
