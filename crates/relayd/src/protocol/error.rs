//! Error descriptors carried in error responses.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Well-known error codes used by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The frame did not decode as a valid envelope.
    ParseError,
    /// The envelope was well formed but could not be accepted.
    InvalidRequest,
    /// No handler is registered under the requested method name.
    MethodNotFound,
    /// The parameters were missing or malformed.
    InvalidParams,
    /// The handler failed unexpectedly.
    InternalError,
    /// Admission was refused because the server is shutting down.
    Cancelled,
}

impl ErrorCode {
    /// Numeric value written to the wire.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::Cancelled => -32097,
        }
    }

    /// Maps a numeric code back to a known variant.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            -32700 => Some(Self::ParseError),
            -32600 => Some(Self::InvalidRequest),
            -32601 => Some(Self::MethodNotFound),
            -32602 => Some(Self::InvalidParams),
            -32603 => Some(Self::InternalError),
            -32097 => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::ParseError => "parse error",
            Self::InvalidRequest => "invalid request",
            Self::MethodNotFound => "method not found",
            Self::InvalidParams => "invalid parameters",
            Self::InternalError => "internal error",
            Self::Cancelled => "request cancelled",
        };
        f.write_str(label)
    }
}

/// Error descriptor: numeric code, message and optional structured data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("[{code}] {message}")]
pub struct RpcError {
    /// Numeric error code.
    pub code: i64,
    /// Human-readable description.
    pub message: String,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Builds an error with a well-known code.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    /// Attaches structured data to the error.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Frame could not be decoded.
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ParseError, message)
    }

    /// Envelope rejected before dispatch.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    /// No handler for `method`.
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            ErrorCode::MethodNotFound,
            format!("no such method \"{method}\""),
        )
    }

    /// Parameters missing or malformed.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, message)
    }

    /// Unexpected handler failure.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Admission refused during shutdown.
    #[must_use]
    pub fn cancelled() -> Self {
        Self::new(ErrorCode::Cancelled, "request cancelled")
    }

    /// The well-known code, if this error carries one.
    #[must_use]
    pub const fn kind(&self) -> Option<ErrorCode> {
        ErrorCode::from_code(self.code)
    }
}
