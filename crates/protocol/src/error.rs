//! Error types for the protocol crate.

use thiserror::Error;

/// Protocol error type covering malformed out-of-band request payloads.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The payload ended before the declared data did.
    #[error("truncated payload: needed {needed} bytes, only {available} available")]
    Truncated {
        /// Bytes the payload declared.
        needed: usize,
        /// Bytes actually present.
        available: usize,
    },

    /// The subsystem name was not valid UTF-8.
    #[error("subsystem name is not valid UTF-8")]
    InvalidUtf8,

    /// Bytes remained after the subsystem name.
    #[error("{0} unexpected trailing bytes after subsystem name")]
    TrailingBytes(usize),
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
