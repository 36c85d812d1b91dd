//! Protocol error types.

use thiserror::Error;

/// Errors arising from decoding or validating protocol data.
///
/// Incompleteness (a buffer ending mid-unit) is deliberately *not* an error:
/// decode entry points signal it out of band so that "wait for more bytes"
/// never shares a path with a genuine parse failure.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The first line of a header block did not match
    /// `<10-digit command id><space><status word>`.
    #[error("malformed header line: {0:?}")]
    MalformedHeader(String),

    /// A header block contained bytes that are not valid UTF-8.
    #[error("header block is not valid UTF-8")]
    InvalidEncoding,

    /// A base64-encoded header value failed to decode.
    #[error("invalid base64 in header value: {0}")]
    Base64(#[from] base64::DecodeError),

    /// A column type tag was not one of the known `VK_*` codes.
    #[error("unknown wire type tag {0:?}")]
    UnknownWireType(String),

    /// A row field opened with a status byte other than 0, 1 or 2.
    #[error("unrecognized row status byte 0x{status:02x}")]
    UnrecognizedRowStatus {
        /// The offending status byte.
        status: u8,
    },

    /// A row field carried the in-band error status; the code is the
    /// server's 4-byte error number. Fatal to the whole row-decode pass.
    #[error("server error {code} embedded in row data")]
    RowServerError {
        /// Server error code.
        code: i32,
    },

    /// A row-data unit arrived while no result set was being received.
    #[error("row data received with no result set in progress")]
    UnexpectedRowData,

    /// A header field the engine depends on was absent.
    #[error("missing header field {0}")]
    MissingField(&'static str),

    /// A header field could not be parsed into its promoted form.
    #[error("invalid value for header field {field}: {value:?}")]
    InvalidField {
        /// Header key (after hyphen removal).
        field: &'static str,
        /// The raw value that failed to parse.
        value: String,
    },
}

/// Result type for protocol operations.
pub type Result<T> = core::result::Result<T, ProtocolError>;
