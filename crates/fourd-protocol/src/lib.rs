//! # fourd-protocol
//!
//! Pure implementation of the request/response protocol spoken by the 4D
//! SQL server over a persistent TCP connection.
//!
//! The wire format is hybrid: responses open with a textual header block
//! (`Key: Value` lines terminated by a double CRLF) and, for result sets,
//! continue with a raw binary run of rows that carries no block delimiter
//! at all. Requests are plain text blocks.
//!
//! ## Design Philosophy
//!
//! This crate is intentionally IO-agnostic. It contains no networking logic
//! and makes no assumptions about the async runtime. Higher-level crates
//! build upon this foundation to provide async I/O capabilities.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod command;
pub mod error;
pub mod frame;
pub mod header;
pub mod row;
pub mod types;

pub use command::{CommandId, Request, Verb};
pub use error::ProtocolError;
pub use frame::{Classification, UnitKind, classify, find_header_end};
pub use header::{
    ColumnDef, HeaderBlock, HeaderValue, ResponseHeader, ResultKind, ServerError, Status,
};
pub use row::{RECORD_NUMBER_COLUMN, RowBatch, RowDecode, RowSchema, decode_row, decode_rows};
pub use types::{Value, WireType};

/// CRLF line terminator used throughout the textual parts of the protocol.
pub const CRLF: &str = "\r\n";

/// Double CRLF terminating a header block.
pub const BLOCK_TERMINATOR: &[u8] = b"\r\n\r\n";
