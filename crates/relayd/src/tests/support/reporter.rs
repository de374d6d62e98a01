//! Test doubles for lifecycle reporting, shutdown signalling and alerts.

use std::net::SocketAddr;
use std::sync::{Arc, Condvar, Mutex};

use crate::services::AlertSink;
use crate::shutdown::{LifecycleReporter, ShutdownError, ShutdownSignal};
use crate::stats::StatsSnapshot;

/// Lifecycle events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Listening(SocketAddr),
    Draining,
    Stopped(StatsSnapshot),
}

/// Records lifecycle events for assertions.
#[derive(Debug, Default)]
pub struct RecordingLifecycleReporter {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingLifecycleReporter {
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .expect("lifecycle reporter mutex poisoned")
            .clone()
    }

    pub fn listening_address(&self) -> Option<SocketAddr> {
        self.events().into_iter().find_map(|event| match event {
            LifecycleEvent::Listening(address) => Some(address),
            _ => None,
        })
    }

    fn record(&self, event: LifecycleEvent) {
        self.events
            .lock()
            .expect("lifecycle reporter mutex poisoned")
            .push(event);
    }
}

impl LifecycleReporter for RecordingLifecycleReporter {
    fn listening(&self, address: SocketAddr, _methods: &[String]) {
        self.record(LifecycleEvent::Listening(address));
    }

    fn draining(&self) {
        self.record(LifecycleEvent::Draining);
    }

    fn stopped(&self, stats: &StatsSnapshot) {
        self.record(LifecycleEvent::Stopped(*stats));
    }
}

/// Shutdown signal fired explicitly by the test.
#[derive(Clone)]
pub struct TestShutdownSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl TestShutdownSignal {
    pub fn new() -> Self {
        Self {
            inner: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    pub fn trigger(&self) {
        let (lock, cvar) = &*self.inner;
        let mut triggered = lock.lock().expect("shutdown mutex poisoned");
        *triggered = true;
        cvar.notify_all();
    }
}

impl ShutdownSignal for TestShutdownSignal {
    fn wait(&self) -> Result<(), ShutdownError> {
        let (lock, cvar) = &*self.inner;
        let mut triggered = lock.lock().expect("shutdown mutex poisoned");
        while !*triggered {
            triggered = cvar
                .wait(triggered)
                .expect("shutdown mutex poisoned during wait");
        }
        Ok(())
    }
}

/// Keeps every alert in memory.
#[derive(Debug, Default)]
pub struct RecordingAlertSink {
    alerts: Mutex<Vec<String>>,
}

impl RecordingAlertSink {
    pub fn alerts(&self) -> Vec<String> {
        self.alerts.lock().expect("alert sink mutex poisoned").clone()
    }
}

impl AlertSink for RecordingAlertSink {
    fn alert(&self, message: &str) {
        self.alerts
            .lock()
            .expect("alert sink mutex poisoned")
            .push(message.to_owned());
    }
}
