use crate::address::ListenAddress;
use crate::logging::LogFormat;

/// Host the server binds to when no address is configured.
pub const DEFAULT_HOST: &str = "localhost";

/// TCP port the server binds to when no address is configured.
pub const DEFAULT_PORT: u16 = 8080;

/// Maximum number of requests executing at once across all connections.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 1000;

/// Requests one connection may have admitted or queued before its reader
/// stops pulling frames off the socket.
pub const DEFAULT_MAX_PENDING: usize = 128;

/// Largest accepted request line, in bytes.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Smallest frame limit accepted by validation.
pub const MIN_FRAME_BYTES: usize = 1024;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default log filter expression used by the binaries.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required.
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

/// Default logging format for the binaries.
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Loopback address the server listens on by default.
pub fn default_listen_address() -> ListenAddress {
    ListenAddress::new(DEFAULT_HOST, DEFAULT_PORT)
}
