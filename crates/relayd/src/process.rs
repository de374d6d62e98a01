//! Process-level launch sequence.

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use relay_config::{Config, ConfigError};
use thiserror::Error;
use tracing::info;

use crate::dispatch::RegistryError;
use crate::server::{Server, ServerError, ShutdownReport};
use crate::services;
use crate::shutdown::{
    LifecycleReporter, ShutdownError, ShutdownSignal, StructuredLifecycleReporter,
    SystemShutdownSignal,
};
use crate::telemetry::{self, TelemetryError};

const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the server configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when any configuration layer is invalid.
    fn load(&self) -> Result<Config, ConfigError>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, ConfigError> {
        Config::load()
    }
}

/// Loader that returns a fixed configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps `config`.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, ConfigError> {
        self.config.validate()?;
        Ok(self.config.clone())
    }
}

/// Errors surfaced while launching or supervising the server.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Config {
        /// Underlying loader error.
        #[source]
        source: ConfigError,
    },
    /// Telemetry could not be installed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The method registry could not be built.
    #[error("failed to register methods: {source}")]
    Registry {
        /// Underlying registry error.
        #[source]
        source: RegistryError,
    },
    /// The server failed to bind, start or stop.
    #[error("server failed: {source}")]
    Server {
        /// Underlying server error.
        #[source]
        source: ServerError,
    },
    /// Waiting for shutdown failed.
    #[error("failed to await shutdown signal: {source}")]
    Shutdown {
        /// Underlying shutdown error.
        #[source]
        source: ShutdownError,
    },
}

impl From<ConfigError> for LaunchError {
    fn from(source: ConfigError) -> Self {
        Self::Config { source }
    }
}

impl From<TelemetryError> for LaunchError {
    fn from(source: TelemetryError) -> Self {
        Self::Telemetry { source }
    }
}

impl From<RegistryError> for LaunchError {
    fn from(source: RegistryError) -> Self {
        Self::Registry { source }
    }
}

impl From<ServerError> for LaunchError {
    fn from(source: ServerError) -> Self {
        Self::Server { source }
    }
}

impl From<ShutdownError> for LaunchError {
    fn from(source: ShutdownError) -> Self {
        Self::Shutdown { source }
    }
}

/// Runs the server with the production collaborators and maps the outcome to
/// a process exit code. A launch failure is written to `stderr`.
pub fn run<W: Write>(stderr: &mut W) -> ExitCode {
    report_outcome(run_server(), stderr)
}

fn report_outcome<W: Write>(
    outcome: Result<ShutdownReport, LaunchError>,
    stderr: &mut W,
) -> ExitCode {
    match outcome {
        Ok(_) => ExitCode::SUCCESS,
        Err(error) => {
            let _ = writeln!(stderr, "relayd: {error}");
            ExitCode::FAILURE
        }
    }
}

/// Runs the server using the production collaborators.
///
/// # Errors
///
/// Returns [`LaunchError`] when any launch step fails.
pub fn run_server() -> Result<ShutdownReport, LaunchError> {
    run_server_with(
        &SystemConfigLoader,
        Arc::new(StructuredLifecycleReporter::new()),
        &SystemShutdownSignal::new(),
    )
}

/// Runs the server with injected collaborators.
///
/// Loads configuration, installs telemetry, registers the built-in methods,
/// binds and starts the server, then blocks on `shutdown` before draining.
///
/// # Errors
///
/// Returns [`LaunchError`] when any launch step fails. A failure while
/// waiting for the shutdown signal still drains the server first.
pub fn run_server_with<L, S>(
    loader: &L,
    reporter: Arc<dyn LifecycleReporter>,
    shutdown: &S,
) -> Result<ShutdownReport, LaunchError>
where
    L: ConfigLoader + ?Sized,
    S: ShutdownSignal + ?Sized,
{
    let config = loader.load()?;
    telemetry::initialise(&config)?;
    info!(
        target: PROCESS_TARGET,
        address = %config.address(),
        max_in_flight = config.max_in_flight(),
        max_pending = config.max_pending(),
        allow_push = config.allow_push(),
        "starting server"
    );

    let registry = services::default_registry()?;
    let server = Server::bind(&config, registry)?;
    let handle = server.start(reporter)?;

    let waited = shutdown.wait();
    let report = handle.shutdown()?;
    waited?;
    info!(target: PROCESS_TARGET, "shutdown sequence completed");
    Ok(report)
}
