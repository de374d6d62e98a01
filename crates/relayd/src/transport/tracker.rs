//! Bookkeeping for live connection workers.

use std::collections::HashMap;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use super::{ConnectionHandler, ConnectionId, LISTENER_TARGET};

struct Tracked {
    stream: TcpStream,
    worker: JoinHandle<()>,
}

/// Spawns one worker thread per connection and keeps enough of each to
/// close and join it at shutdown.
#[derive(Default)]
pub(crate) struct ConnectionTracker {
    next_id: AtomicU64,
    live: Mutex<HashMap<ConnectionId, Tracked>>,
}

impl ConnectionTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn live(&self) -> MutexGuard<'_, HashMap<ConnectionId, Tracked>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hands `stream` to `handler` on a new thread.
    pub(crate) fn spawn(&self, stream: TcpStream, handler: &Arc<dyn ConnectionHandler>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let control = match stream.try_clone() {
            Ok(control) => control,
            Err(error) => {
                warn!(
                    target: LISTENER_TARGET,
                    connection = id,
                    error = %error,
                    "failed to clone connection stream; dropping connection"
                );
                return;
            }
        };
        let handler = Arc::clone(handler);
        let spawned = thread::Builder::new()
            .name(format!("relay-conn-{id}"))
            .spawn(move || handler.handle(id, stream));
        let worker = match spawned {
            Ok(worker) => worker,
            Err(error) => {
                warn!(
                    target: LISTENER_TARGET,
                    connection = id,
                    error = %error,
                    "failed to start connection worker; dropping connection"
                );
                if let Err(error) = control.shutdown(Shutdown::Both) {
                    debug!(
                        target: LISTENER_TARGET,
                        connection = id,
                        error = %error,
                        "connection already closed"
                    );
                }
                return;
            }
        };

        let mut live = self.live();
        live.retain(|_, tracked| !tracked.worker.is_finished());
        live.insert(
            id,
            Tracked {
                stream: control,
                worker,
            },
        );
    }

    /// Number of workers that have not yet finished.
    pub(crate) fn active(&self) -> usize {
        self.live()
            .values()
            .filter(|tracked| !tracked.worker.is_finished())
            .count()
    }

    /// Stops reading from every connection and waits for each worker.
    ///
    /// Only the read half is closed, so responses already produced are still
    /// written before the worker exits.
    pub(crate) fn close_all(&self) {
        let drained: Vec<_> = self.live().drain().collect();
        for (id, tracked) in &drained {
            if let Err(error) = tracked.stream.shutdown(Shutdown::Read) {
                debug!(
                    target: LISTENER_TARGET,
                    connection = id,
                    error = %error,
                    "connection already closed"
                );
            }
        }
        for (id, tracked) in drained {
            if tracked.worker.join().is_err() {
                warn!(
                    target: LISTENER_TARGET,
                    connection = id,
                    "connection worker panicked"
                );
            }
        }
    }
}
