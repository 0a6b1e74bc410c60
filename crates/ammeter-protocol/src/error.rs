//! Error types for the ammeter protocol.

use thiserror::Error;

/// Errors that can occur when framing or parsing device output.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// A recognized record carried the wrong number of fields.
    #[error("invalid number of fields in {kind} record: expected {expected}, got {actual}")]
    FieldCount {
        /// Record kind token (e.g. `DATA`).
        kind: &'static str,
        /// Human readable description of the accepted counts.
        expected: &'static str,
        /// Number of colon-separated tokens received.
        actual: usize,
    },

    /// A field could not be converted to its typed value.
    #[error("invalid {field} in {kind} record: {value:?}")]
    InvalidField {
        /// Record kind token.
        kind: &'static str,
        /// Name of the offending field.
        field: &'static str,
        /// Raw field text.
        value: String,
    },

    /// A line was not valid UTF-8.
    #[error("invalid UTF-8 in received line")]
    InvalidUtf8,

    /// Unterminated data grew beyond the pending buffer limit.
    #[error("buffer overflow: max {max} bytes, got {actual}")]
    BufferOverflow {
        /// Maximum number of unterminated bytes kept.
        max: usize,
        /// Number of bytes that were buffered.
        actual: usize,
    },
}

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
