//! Endpoint error record.

use std::fmt;

use thiserror::Error;

/// What went wrong, independent of the human-readable description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// `accept` returned failure while Listening. Fatal.
    AcceptFailed,
    /// A frame could not be received: signature mismatch, invalid size, or a
    /// hard read error mid-frame.
    ReceiveFailed,
    /// The payload codec rejected the bytes.
    ParseFailed,
    /// A frame carried a type id the registry does not know.
    UnknownMessageType,
    /// The payload buffer could not be allocated. Fatal.
    OutOfMemory,
    /// The peer is gone; a keep-alive probe failed.
    ConnectionReset,
    /// An outgoing message could not be written.
    SendFailed,
    /// An operation was invoked in a state that does not allow it.
    InvalidState,
    /// An argument failed validation.
    InvalidArgument,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::AcceptFailed => "accept failed",
            ErrorKind::ReceiveFailed => "receive failed",
            ErrorKind::ParseFailed => "parse failed",
            ErrorKind::UnknownMessageType => "unknown message type",
            ErrorKind::OutOfMemory => "out of memory",
            ErrorKind::ConnectionReset => "connection reset",
            ErrorKind::SendFailed => "send failed",
            ErrorKind::InvalidState => "invalid state",
            ErrorKind::InvalidArgument => "invalid argument",
        };
        f.write_str(name)
    }
}

/// One recorded endpoint error.
///
/// The endpoint retains the most recent record. Fatal records additionally
/// drive the lifecycle to the Error state.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct SocketError {
    kind: ErrorKind,
    message: String,
    fatal: bool,
}

impl SocketError {
    /// Creates a non-fatal error record.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            fatal: false,
        }
    }

    /// Creates a fatal error record.
    pub fn fatal(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            fatal: true,
        }
    }

    /// The error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Human-readable description.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true if this error aborted the connection.
    pub fn is_fatal(&self) -> bool {
        self.fatal
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn new_records_are_not_fatal() {
        let err = SocketError::new(ErrorKind::ReceiveFailed, "Header mismatch");
        assert_eq!(err.kind(), ErrorKind::ReceiveFailed);
        assert_eq!(err.message(), "Header mismatch");
        assert!(!err.is_fatal());
    }

    #[test]
    fn fatal_records_carry_the_flag() {
        let err = SocketError::fatal(ErrorKind::OutOfMemory, "Out of memory");
        assert!(err.is_fatal());
    }

    #[test]
    fn display_includes_kind_and_message() {
        let err = SocketError::new(ErrorKind::ConnectionReset, "Connection reset by peer");
        assert_eq!(err.to_string(), "connection reset: Connection reset by peer");
    }
}
