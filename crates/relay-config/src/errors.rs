//! Configuration error types.

use std::sync::Arc;

use ortho_config::OrthoError;
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A layer could not be read or parsed. Covers bad flags, malformed
    /// environment values, and unreadable or malformed configuration files.
    #[error("failed to load configuration: {0}")]
    Load(#[from] Arc<OrthoError>),
    /// The global concurrency bound was zero.
    #[error("max_in_flight must be at least 1")]
    ZeroConcurrency,
    /// The per-connection pending window was zero.
    #[error("max_pending must be at least 1")]
    ZeroPending,
    /// The frame limit is too small to hold a useful request.
    #[error("max_frame_bytes must be at least {minimum}, got {value}")]
    FrameLimitTooSmall {
        /// Configured limit.
        value: usize,
        /// Smallest accepted limit.
        minimum: usize,
    },
}
