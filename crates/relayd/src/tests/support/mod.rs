//! Test harness utilities shared by the behavioural suites.

mod client;
mod gate;
mod reporter;

use std::net::SocketAddr;
use std::sync::Arc;

use relay_config::{Config, ListenAddress, LogFormat};

use crate::dispatch::MethodRegistry;
use crate::server::{Server, ServerHandle, ShutdownReport};
use crate::services;

pub use client::{RpcClient, error_code};
pub use gate::{Gate, wait_until};
pub use reporter::{
    LifecycleEvent, RecordingAlertSink, RecordingLifecycleReporter, TestShutdownSignal,
};

/// Configuration bound to an ephemeral loopback port.
pub fn loopback_config(max_in_flight: usize) -> Config {
    Config {
        address: ListenAddress::new("127.0.0.1", 0),
        max_in_flight,
        log_filter: "off".into(),
        log_format: LogFormat::Compact,
        ..Config::default()
    }
}

/// A started server with the built-in methods, a recording alert sink and a
/// `Test.block` method parked on a [`Gate`].
pub struct TestServer {
    handle: Option<ServerHandle>,
    addr: SocketAddr,
    pub gate: Arc<Gate>,
    pub alerts: Arc<RecordingAlertSink>,
    pub reporter: Arc<RecordingLifecycleReporter>,
}

impl TestServer {
    pub fn start(config: &Config) -> Self {
        let gate = Gate::new();
        let alerts = Arc::new(RecordingAlertSink::default());
        let reporter = Arc::new(RecordingLifecycleReporter::default());

        let mut registry = MethodRegistry::new();
        services::register_all(&mut registry, Arc::clone(&alerts) as Arc<dyn services::AlertSink>)
            .expect("register built-in methods");
        gate.register(&mut registry);

        let server = Server::bind(config, registry).expect("bind server");
        let handle = server
            .start(Arc::clone(&reporter) as Arc<dyn crate::shutdown::LifecycleReporter>)
            .expect("start server");
        Self {
            addr: handle.local_addr(),
            handle: Some(handle),
            gate,
            alerts,
            reporter,
        }
    }

    /// Bound address; still available after shutdown.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn client(&self) -> RpcClient {
        RpcClient::connect(self.addr())
    }

    pub fn handle(&self) -> &ServerHandle {
        self.handle.as_ref().expect("server already shut down")
    }

    pub fn shutdown(&mut self) -> ShutdownReport {
        self.gate.open();
        self.handle
            .take()
            .expect("server already shut down")
            .shutdown()
            .expect("server shuts down cleanly")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.gate.open();
        if let Some(handle) = self.handle.take() {
            let _ = handle.shutdown();
        }
    }
}
