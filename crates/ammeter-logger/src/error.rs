//! Error types for the ammeter client.

use std::io;

use thiserror::Error;

/// Errors that can occur while talking to the ammeter.
///
/// A command that simply gets no answer is not an error; query operations
/// report that as `Ok(None)` (or `Ok(false)`).
#[derive(Debug, Error)]
pub enum ClientError {
    /// Writing to or reading from the transport failed.
    #[error("transport error: {0}")]
    Transport(#[source] io::Error),

    /// The serial port could not be opened.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The background receive loop has exited after a fatal error.
    #[error("receive loop stopped: {0}")]
    ReceiverStopped(String),

    /// Local I/O error (thread spawn, report file).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
