//! Error types for the link engine

use hmi_protocol::{ParseError, Response, ResultCode};
use thiserror::Error;

/// Errors that can occur while talking to a display
#[derive(Debug, Error)]
pub enum LinkError {
    /// No (or only a partial) response within the read timeout
    #[error("timed out waiting for response")]
    Timeout,

    /// Stream desync: unexpected leading code or missing terminator
    #[error("protocol error: {0}")]
    Protocol(ParseError),

    /// Well-formed reply of an unexpected kind
    #[error("unexpected {actual:?} in place of {expected} response")]
    UnexpectedResponse {
        expected: &'static str,
        actual: Response,
    },

    /// Device rejected the command
    #[error("device error: {0}")]
    Device(ResultCode),

    /// Caller-side precondition violated; nothing was sent
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Another command held the link for too long
    #[error("timed out waiting for the command lock")]
    LockTimeout,

    /// Operation not valid in the current link state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Transport reached end of stream
    #[error("link closed")]
    Closed,

    /// Transport I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port could not be opened
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),
}

impl From<ParseError> for LinkError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::InvalidArgument(msg) => LinkError::InvalidArgument(msg),
            other => LinkError::Protocol(other),
        }
    }
}

impl LinkError {
    /// The device result code, if the device rejected the command
    pub fn device_code(&self) -> Option<ResultCode> {
        match self {
            LinkError::Device(code) => Some(*code),
            _ => None,
        }
    }

    /// Returns true for errors a caller may reasonably retry
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LinkError::Timeout | LinkError::LockTimeout | LinkError::Protocol(_)
        )
    }
}
