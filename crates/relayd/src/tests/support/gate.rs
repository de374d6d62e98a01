//! A handler that parks requests until the test releases them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::{Value, json};

use crate::dispatch::{HandlerError, MethodRegistry, RequestContext};

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Holds every caller of `Test.block` until [`Gate::open`] is called and
/// records how many were inside at once.
#[derive(Default)]
pub struct Gate {
    open: Mutex<bool>,
    changed: Condvar,
    running: AtomicUsize,
    peak: AtomicUsize,
    finished: AtomicUsize,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn open(&self) {
        let mut open = self.open.lock().expect("gate lock");
        *open = true;
        self.changed.notify_all();
    }

    fn pass(&self) {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let mut open = self.open.lock().expect("gate lock");
        while !*open {
            open = self.changed.wait(open).expect("gate wait");
        }
        drop(open);
        self.running.fetch_sub(1, Ordering::SeqCst);
        self.finished.fetch_add(1, Ordering::SeqCst);
    }

    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    /// Waits until exactly `expected` callers are parked.
    pub fn wait_for_running(&self, expected: usize) -> bool {
        wait_until(|| self.running() == expected)
    }

    /// Registers `Test.block`, which parks at the gate and then returns
    /// its parameters.
    pub fn register(self: &Arc<Self>, registry: &mut MethodRegistry) {
        let gate = Arc::clone(self);
        registry
            .register(
                "Test",
                "block",
                move |_: &RequestContext, params: Option<Value>| -> Result<Value, HandlerError> {
                    gate.pass();
                    Ok(params.unwrap_or_else(|| json!("done")))
                },
            )
            .expect("register Test.block");
    }
}

pub fn wait_until(predicate: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        thread::sleep(POLL_INTERVAL);
    }
    predicate()
}
