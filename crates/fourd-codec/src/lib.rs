//! # fourd-codec
//!
//! Async framing for the 4D SQL server protocol: a `tokio_util::codec`
//! codec that reassembles the byte stream into complete protocol units
//! (header blocks or row-data runs) and encodes outbound requests.
//!
//! The transport may deliver any unit split across multiple receive events
//! or several units coalesced into one; the codec's accumulating buffer
//! absorbs both.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod unit_codec;

pub use error::CodecError;
pub use unit_codec::{Unit, UnitCodec};
