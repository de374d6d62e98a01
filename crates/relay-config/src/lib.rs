//! Shared configuration for the relay server.
//!
//! Settings are merged by `ortho_config` from four layers, lowest precedence
//! first: built-in defaults, an optional TOML file (`--config-path` or
//! `RELAY_CONFIG_PATH`), `RELAY_*` environment variables, and command-line
//! flags. The merged [`Config`] is validated before it is returned so the
//! server never starts with an unusable address or a zero concurrency bound.

mod address;
mod defaults;
mod errors;
mod logging;

use std::ffi::OsString;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use address::{AddressParseError, ListenAddress};
pub use defaults::{
    DEFAULT_HOST, DEFAULT_LOG_FILTER, DEFAULT_MAX_FRAME_BYTES, DEFAULT_MAX_IN_FLIGHT,
    DEFAULT_MAX_PENDING, DEFAULT_PORT, MIN_FRAME_BYTES, default_listen_address, default_log_filter, default_log_filter_string,
    default_log_format,
};
pub use errors::ConfigError;
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "RELAY")]
pub struct Config {
    /// Address the listener binds to, as `host:port`.
    #[ortho_config(default = default_listen_address())]
    pub address: ListenAddress,
    /// Global bound on requests executing at once.
    #[ortho_config(default = DEFAULT_MAX_IN_FLIGHT)]
    pub max_in_flight: usize,
    /// Requests one connection may have admitted or queued at once.
    #[ortho_config(default = DEFAULT_MAX_PENDING)]
    pub max_pending: usize,
    /// Whether handlers may push notifications to their caller.
    #[ortho_config(default = true)]
    pub allow_push: bool,
    /// Largest accepted request line, in bytes.
    #[ortho_config(default = DEFAULT_MAX_FRAME_BYTES)]
    pub max_frame_bytes: usize,
    /// `tracing` filter expression.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Output format for structured logs.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: default_listen_address(),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            max_pending: DEFAULT_MAX_PENDING,
            allow_push: true,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Loads configuration from the process arguments, environment, and an
    /// optional configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when any layer fails to parse or the merged
    /// result fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_iter(std::env::args_os())
    }

    /// Loads configuration using the supplied argument list instead of the
    /// process arguments. The first item is the program name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] when any layer fails to parse, or a
    /// validation error when the merged result is out of range.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let config = <Self as OrthoConfig>::load_from_iter(args)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks invariants that no single layer can enforce on its own.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroConcurrency`], [`ConfigError::ZeroPending`]
    /// or [`ConfigError::FrameLimitTooSmall`] for out-of-range values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_in_flight == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.max_pending == 0 {
            return Err(ConfigError::ZeroPending);
        }
        if self.max_frame_bytes < MIN_FRAME_BYTES {
            return Err(ConfigError::FrameLimitTooSmall {
                value: self.max_frame_bytes,
                minimum: MIN_FRAME_BYTES,
            });
        }
        Ok(())
    }

    /// Address the listener binds to.
    #[must_use]
    pub fn address(&self) -> &ListenAddress {
        &self.address
    }

    /// Global bound on requests executing at once.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Requests one connection may have admitted or queued at once.
    #[must_use]
    pub fn max_pending(&self) -> usize {
        self.max_pending
    }

    /// Whether handlers may push notifications.
    #[must_use]
    pub fn allow_push(&self) -> bool {
        self.allow_push
    }

    /// Largest accepted request line, in bytes.
    #[must_use]
    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    /// `tracing` filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Output format for structured logs.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn defaults_pass_validation() {
        assert!(Config::default().validate().is_ok());
    }

    #[rstest]
    #[case::no_slots(Config { max_in_flight: 0, ..Config::default() })]
    #[case::no_pending(Config { max_pending: 0, ..Config::default() })]
    #[case::tiny_frames(Config { max_frame_bytes: MIN_FRAME_BYTES - 1, ..Config::default() })]
    fn out_of_range_values_are_rejected(#[case] config: Config) {
        assert!(config.validate().is_err());
    }
}
