use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// TCP address the server listens on, kept as `host:port` so host names are
/// resolved at bind time rather than at configuration time.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(try_from = "String", into = "String")]
pub struct ListenAddress {
    host: String,
    port: u16,
}

/// Host used when an address omits it (for example `:8080`).
const UNSPECIFIED_HOST: &str = "0.0.0.0";

impl ListenAddress {
    /// Builds an address from its parts.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host name or IP literal, without IPv6 brackets.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port. Zero asks the operating system for an ephemeral port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for ListenAddress {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(formatter, "[{}]:{}", self.host, self.port)
        } else {
            write!(formatter, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for ListenAddress {
    type Err = AddressParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(AddressParseError::Empty);
        }
        let (host, port) = trimmed
            .rsplit_once(':')
            .ok_or_else(|| AddressParseError::MissingPort(trimmed.to_string()))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.contains(':') && !trimmed.starts_with('[') {
            return Err(AddressParseError::UnbracketedIpv6(trimmed.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| AddressParseError::InvalidPort(port.to_string()))?;
        let host = if host.is_empty() {
            UNSPECIFIED_HOST
        } else {
            host
        };
        Ok(Self::new(host, port))
    }
}

impl TryFrom<String> for ListenAddress {
    type Error = AddressParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ListenAddress> for String {
    fn from(value: ListenAddress) -> Self {
        value.to_string()
    }
}

/// Errors encountered while parsing a [`ListenAddress`] from text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressParseError {
    /// No address was supplied.
    #[error("listen address is empty")]
    Empty,
    /// The address lacked a `:port` suffix.
    #[error("missing port in '{0}'")]
    MissingPort(String),
    /// The port was not a number in `0..=65535`.
    #[error("invalid port '{0}'")]
    InvalidPort(String),
    /// IPv6 literals must be bracketed to separate them from the port.
    #[error("IPv6 address '{0}' must be written as [host]:port")]
    UnbracketedIpv6(String),
}
