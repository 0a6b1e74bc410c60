//! Byte transport between the client and the ammeter.

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

mod mock;
mod serial;

pub use mock::{MockTransport, Responder};
pub use serial::SerialTransport;

/// A transport shared by the receive loop and command writers.
///
/// The receive loop holds the lock only for one non-blocking read; command
/// writers hold it only for one write.
pub type SharedTransport = Arc<Mutex<Box<dyn Transport>>>;

/// Byte-level link to the device.
pub trait Transport: Send {
    /// Read whatever bytes are currently pending into `buf`.
    ///
    /// Must not block beyond a short read timeout; returns `Ok(0)` when
    /// nothing is pending.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write every byte of `data` and flush.
    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Identify the endpoint for log messages.
    fn describe(&self) -> String;
}

/// Wrap a transport for sharing between threads.
pub fn shared<T: Transport + 'static>(transport: T) -> SharedTransport {
    Arc::new(Mutex::new(Box::new(transport)))
}
