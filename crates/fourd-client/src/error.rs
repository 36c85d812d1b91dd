//! Client error types.

use fourd_protocol::ServerError;
use thiserror::Error;

/// Errors that can occur during client operations.
#[derive(Debug, Error)]
pub enum Error {
    /// TCP connection could not be established.
    #[error("connection failed: {0}")]
    Connection(String),

    /// TCP connect did not complete within the configured timeout.
    #[error("connect timed out")]
    ConnectTimeout,

    /// No bytes arrived within the idle timeout. The connection is marked
    /// disconnected; commands still pending are not failed retroactively.
    #[error("connection idle timeout")]
    IdleTimeout,

    /// The peer closed the transport mid-exchange.
    #[error("connection closed")]
    ConnectionClosed,

    /// Operation attempted while not connected. Fails fast and
    /// synchronously; requests are never queued.
    #[error("not connected to database")]
    NotConnected,

    /// Protocol decode failure.
    #[error("protocol error: {0}")]
    Protocol(#[from] fourd_protocol::ProtocolError),

    /// Framing/codec failure.
    #[error("codec error: {0}")]
    Codec(#[from] fourd_codec::CodecError),

    /// The server reported an error for a command.
    #[error("{0}")]
    Server(ServerError),

    /// A statement placeholder had no supplied parameter value.
    #[error("parameter {name:?} is undefined in statement")]
    UndefinedParameter {
        /// Placeholder name (without the `$`).
        name: String,
    },

    /// The server's response did not fit the expected exchange shape.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error is transient and may succeed on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectTimeout
                | Self::IdleTimeout
                | Self::ConnectionClosed
                | Self::Connection(_)
                | Self::Io(_)
        )
    }

    /// The server error code, if this is a server-reported error.
    #[must_use]
    pub fn server_code(&self) -> Option<i32> {
        match self {
            Self::Server(err) => Some(err.code),
            _ => None,
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;
