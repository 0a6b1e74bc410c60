//! Background receive loop.
//!
//! One named thread reads pending bytes from the shared transport, assembles
//! them into lines, parses each line and applies it to the [`SessionState`].
//! The thread waits on a stop channel between idle polls so `stop()` takes
//! effect without waiting out the poll interval.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ammeter_metrics::metric_defs;
use ammeter_protocol::{LineCodec, ProtocolError, Record};
use crossbeam_channel::{Receiver as StopReceiver, RecvTimeoutError, Sender, TryRecvError};

use crate::config::ClientConfig;
use crate::error::Result;
use crate::state::{epoch_now, Applied, SessionState};
use crate::transport::SharedTransport;

/// Name of the receive thread.
pub const THREAD_NAME: &str = "ammeter-recv";

/// A line that failed to parse and has not yet been followed by another
/// record.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Unresolved {
    pub line: String,
    pub reason: &'static str,
}

/// Per-thread receive state.
pub(crate) struct ReceiveWorker {
    transport: SharedTransport,
    state: Arc<SessionState>,
    codec: LineCodec,
    buf: Vec<u8>,
    description: String,
    unresolved: Option<Unresolved>,
}

impl ReceiveWorker {
    pub(crate) fn new(transport: SharedTransport, state: Arc<SessionState>, read_chunk_size: usize) -> Self {
        let description = transport.lock().describe();
        ReceiveWorker {
            transport,
            state,
            codec: LineCodec::new(),
            buf: vec![0u8; read_chunk_size.max(1)],
            description,
            unresolved: None,
        }
    }

    /// Run until the stop channel fires or the transport fails.
    fn run(mut self, stop_rx: StopReceiver<()>, poll: Duration) {
        tracing::debug!(transport = %self.description, "receive loop started");

        loop {
            match self.poll_once() {
                Ok(0) => match stop_rx.recv_timeout(poll) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                },
                Ok(_) => match stop_rx.try_recv() {
                    Err(TryRecvError::Empty) => continue,
                    Ok(()) | Err(TryRecvError::Disconnected) => break,
                },
                Err(e) => {
                    tracing::error!(transport = %self.description, error = %e, "transport read failed, receive loop exiting");
                    self.state.record_failure(format!("{}: {}", self.description, e));
                    break;
                }
            }
        }

        self.finish();
        tracing::debug!(transport = %self.description, "receive loop stopped");
    }

    /// Discard a record still held when the loop exits; no record can follow it.
    pub(crate) fn finish(&mut self) {
        if let Some(held) = self.unresolved.take() {
            self.discard(held);
        }
    }

    /// Read once and process every complete line; returns the bytes read.
    pub(crate) fn poll_once(&mut self) -> io::Result<usize> {
        let n = self.transport.lock().read(&mut self.buf)?;
        if n == 0 {
            return Ok(0);
        }

        metrics::counter!(metric_defs::BYTES_RECEIVED.name).increment(n as u64);
        self.codec.push(&self.buf[..n]);

        for line in self.codec.drain() {
            match line {
                Ok(line) => self.handle_line(line),
                Err(e) => self.drop_framing_error(e),
            }
        }
        Ok(n)
    }

    fn handle_line(&mut self, line: String) {
        if let Some(held) = self.unresolved.take() {
            self.discard(held);
        }

        match Record::parse(&line) {
            Ok(Record::Blank) => {}
            Ok(Record::Unrecognized(line)) => {
                tracing::debug!(transport = %self.description, line = %line, "unrecognized record");
                self.unresolved = Some(Unresolved {
                    line,
                    reason: "unrecognized",
                });
            }
            Ok(record) => self.apply(record, epoch_now()),
            Err(e) => {
                tracing::error!(transport = %self.description, line = %line, error = %e, "malformed record");
                self.unresolved = Some(Unresolved {
                    line,
                    reason: "malformed",
                });
            }
        }
    }

    fn apply(&mut self, record: Record, received_epoch: f64) {
        let kind = record.kind().map_or("none", |kind| kind.as_str());
        metrics::counter!(metric_defs::RECORDS_RECEIVED.name, "kind" => kind).increment(1);

        match self.state.apply(record, received_epoch) {
            Applied::Reading(count) => {
                metrics::gauge!(metric_defs::WINDOW_READINGS.name).set(count as f64);
                tracing::trace!(transport = %self.description, count, "reading received");
            }
            Applied::WindowOpened => {
                metrics::gauge!(metric_defs::WINDOW_READINGS.name).set(0.0);
                tracing::info!(transport = %self.description, "sampling started");
            }
            Applied::WindowClosed(runtime) => {
                tracing::info!(transport = %self.description, runtime = ?runtime, "sampling stopped");
            }
            Applied::StopWithoutStart => {
                tracing::warn!(transport = %self.description, "STOP received without a START");
            }
            Applied::Config | Applied::Status => {
                tracing::debug!(transport = %self.description, kind, "state updated");
            }
            Applied::Ignored => {}
        }
    }

    fn discard(&self, held: Unresolved) {
        metrics::counter!(metric_defs::RECORDS_DROPPED.name, "reason" => held.reason).increment(1);
        tracing::warn!(
            transport = %self.description,
            line = %held.line,
            reason = held.reason,
            "discarding record"
        );
    }

    fn drop_framing_error(&self, error: ProtocolError) {
        metrics::counter!(metric_defs::RECORDS_DROPPED.name, "reason" => "framing").increment(1);
        tracing::warn!(transport = %self.description, error = %error, "dropping unreadable input");
    }

    #[cfg(test)]
    pub(crate) fn unresolved(&self) -> Option<&Unresolved> {
        self.unresolved.as_ref()
    }
}

/// Handle to the receive thread.
pub struct Receiver {
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Receiver {
    /// Start the receive thread.
    pub fn spawn(transport: SharedTransport, state: Arc<SessionState>, config: &ClientConfig) -> Result<Self> {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let worker = ReceiveWorker::new(transport, state, config.read_chunk_size);
        let poll = config.receive_poll_interval;

        let thread = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || worker.run(stop_rx, poll))?;

        Ok(Receiver {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }

    /// Check if the receive thread is still running.
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the receive thread and wait for it to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.try_send(());
        }
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                tracing::error!("receive thread panicked");
            }
        }
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        // Disconnecting the channel stops the loop; don't wait for it here.
        self.stop_tx.take();
    }
}
