//! Per-connection single-writer queue.
//!
//! Responses and notifications from every request thread of a connection are
//! funnelled through one channel and written by one thread, so frames never
//! interleave and each sender's messages keep their enqueue order. The
//! channel is bounded: senders block while the peer is not reading.

use std::io::{self, BufWriter, Write};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use super::LISTENER_TARGET;
use super::codec::{FrameError, FrameWriter};
use crate::protocol::Outbound;

/// Identifier assigned to each accepted connection.
pub type ConnectionId = u64;

/// Handle to a connection's writer thread.
#[derive(Debug)]
pub(crate) struct OutboundQueue {
    handle: JoinHandle<()>,
}

impl OutboundQueue {
    /// Starts the writer thread for `sink`, holding at most `bound` queued
    /// messages.
    ///
    /// `on_failure` runs once if a write fails, after which the thread stops
    /// and further sends report the queue as closed.
    ///
    /// # Errors
    ///
    /// Returns the OS error when the writer thread cannot be created.
    pub(crate) fn spawn<W, F>(
        connection: ConnectionId,
        sink: W,
        bound: usize,
        on_failure: F,
    ) -> io::Result<(SyncSender<Outbound>, Self)>
    where
        W: Write + Send + 'static,
        F: FnOnce() + Send + 'static,
    {
        let (sender, receiver) = mpsc::sync_channel(bound.max(1));
        let builder = thread::Builder::new().name(format!("relay-conn-{connection}-writer"));
        let handle = builder.spawn(move || {
            let writer = FrameWriter::new(BufWriter::new(sink));
            if let Err(error) = drain(&receiver, writer) {
                warn!(
                    target: LISTENER_TARGET,
                    connection,
                    error = %error,
                    "connection write failed"
                );
                on_failure();
            }
        })?;
        Ok((sender, Self { handle }))
    }

    /// Waits for the writer to flush everything queued before the last
    /// sender was dropped.
    pub(crate) fn join(self, connection: ConnectionId) {
        if self.handle.join().is_err() {
            warn!(
                target: LISTENER_TARGET,
                connection,
                "connection writer panicked"
            );
        }
    }
}

fn drain<W: Write>(
    receiver: &Receiver<Outbound>,
    mut writer: FrameWriter<W>,
) -> Result<(), FrameError> {
    while let Ok(first) = receiver.recv() {
        writer.write(&first)?;
        let mut batched = 1_usize;
        while let Ok(next) = receiver.try_recv() {
            writer.write(&next)?;
            batched += 1;
        }
        writer.flush()?;
        debug!(target: LISTENER_TARGET, batched, "flushed outbound frames");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::protocol::{Notification, RequestId, Response};

    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().expect("sink lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BrokenSink;

    impl Write for BrokenSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"))
        }
    }

    #[rstest]
    fn frames_keep_enqueue_order() {
        let sink = SharedSink::default();
        let (sender, queue) = OutboundQueue::spawn(1, sink.clone(), 4, || {}).expect("writer");
        for index in 0..20_u64 {
            let message = if index % 2 == 0 {
                Outbound::from(Notification::new("tick", Some(json!([index]))))
            } else {
                Outbound::from(Response::new(Some(RequestId::from(index)), Ok(json!(index))))
            };
            sender.send(message).expect("queue open");
        }
        drop(sender);
        queue.join(1);

        let bytes = sink.0.lock().expect("sink lock").clone();
        let output = String::from_utf8(bytes).expect("utf8 output");
        let values: Vec<u64> = output
            .lines()
            .map(|line| {
                let value: serde_json::Value = serde_json::from_str(line).expect("json line");
                value
                    .get("result")
                    .or_else(|| value["params"].get(0))
                    .and_then(serde_json::Value::as_u64)
                    .expect("numeric payload")
            })
            .collect();
        assert_eq!(values, (0..20).collect::<Vec<_>>());
    }

    #[rstest]
    fn write_failure_closes_the_queue() {
        let failed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&failed);
        let (sender, queue) = OutboundQueue::spawn(2, BrokenSink, 4, move || {
            flag.store(true, Ordering::SeqCst);
        })
        .expect("writer");
        sender
            .send(Notification::new("tick", None).into())
            .expect("first send succeeds");
        queue.join(2);

        assert!(failed.load(Ordering::SeqCst));
        assert!(sender.send(Notification::new("tick", None).into()).is_err());
    }

    struct StalledSink {
        released: Arc<(Mutex<bool>, std::sync::Condvar)>,
    }

    impl Write for StalledSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let (lock, released) = &*self.released;
            let mut open = lock.lock().expect("stall lock");
            while !*open {
                open = released.wait(open).expect("stall wait");
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[rstest]
    fn full_queue_refuses_more_messages_until_the_writer_drains() {
        let released = Arc::new((Mutex::new(false), std::sync::Condvar::new()));
        let sink = StalledSink {
            released: Arc::clone(&released),
        };
        let (sender, queue) = OutboundQueue::spawn(3, sink, 2, || {}).expect("writer");

        // The writer stalls on its first flush; the queue then fills up.
        let mut full = false;
        for _ in 0..50 {
            match sender.try_send(Notification::new("tick", None).into()) {
                Ok(()) => {}
                Err(mpsc::TrySendError::Full(_)) => {
                    full = true;
                    break;
                }
                Err(mpsc::TrySendError::Disconnected(_)) => panic!("writer stopped"),
            }
        }
        assert!(full, "bounded queue never filled");
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(matches!(
            sender.try_send(Notification::new("tick", None).into()),
            Err(mpsc::TrySendError::Full(_))
        ));

        let (lock, condvar) = &*released;
        *lock.lock().expect("stall lock") = true;
        condvar.notify_all();
        sender
            .send(Notification::new("tick", None).into())
            .expect("queue drains once the sink accepts writes");
        drop(sender);
        queue.join(3);
    }
}
