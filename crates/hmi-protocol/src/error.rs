//! Error types for HMI protocol parsing and encoding

use thiserror::Error;

/// Errors that can occur while parsing protocol data or building commands
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Message is incomplete - need more data
    #[error("incomplete message: need {needed} more bytes")]
    Incomplete { needed: usize },

    /// Leading code is not valid for the requested response kind
    #[error("unexpected leading code 0x{code:02X} for {expected} response")]
    UnexpectedCode { code: u8, expected: &'static str },

    /// Message does not end with the 3-byte terminator
    #[error("missing terminator in {len}-byte message")]
    MissingTerminator { len: usize },

    /// Message length does not match what the response kind requires
    #[error("invalid message length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Caller-supplied result buffer cannot hold the payload
    #[error("result buffer too small: need {needed} bytes, have {capacity}")]
    BufferTooSmall { needed: usize, capacity: usize },

    /// Leading code is not an event code
    #[error("unknown event code: 0x{0:02X}")]
    UnknownEvent(u8),

    /// Event payload carries an out-of-range field
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// Command argument rejected before encoding
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
