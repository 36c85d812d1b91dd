//! Codec error types.

use thiserror::Error;

/// Errors that can occur during framing and unit decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    /// IO error from the underlying transport.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol-level decode failure.
    #[error("protocol error: {0}")]
    Protocol(#[from] fourd_protocol::ProtocolError),

    /// A header block exceeded the configured maximum size without ever
    /// producing its double-CRLF terminator.
    #[error("header block too large: {size} bytes (max {max})")]
    HeaderTooLarge {
        /// Accumulated size so far.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// The buffer prefix matches neither a header block nor a row-data
    /// block; the stream is desynchronized.
    #[error("unrecognized protocol unit starting with byte 0x{first:02x}")]
    Desynchronized {
        /// The first byte of the unrecognized prefix.
        first: u8,
    },
}

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;
