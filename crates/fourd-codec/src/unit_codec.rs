//! Protocol unit codec implementation.

use bytes::{Buf, BytesMut};
use fourd_protocol::frame::{Classification, UnitKind, classify, find_header_end};
use fourd_protocol::header::HeaderBlock;
use fourd_protocol::row::{RowBatch, RowSchema, decode_rows};
use fourd_protocol::{ProtocolError, Request};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CodecError;

/// Default cap on a single header block.
pub const DEFAULT_MAX_HEADER_SIZE: usize = 64 * 1024;

/// One complete inbound protocol unit.
#[derive(Debug)]
pub enum Unit {
    /// A parsed header block.
    Header(HeaderBlock),
    /// A run of fully decoded rows. Row-data units carry no command id;
    /// they belong to the command the last header was dispatched for.
    Rows(RowBatch),
}

/// Codec turning the raw byte stream into [`Unit`]s and encoding outbound
/// [`Request`]s.
///
/// The row-data path is only active while a column schema is installed
/// (set by the connection after a Result-Set header, cleared when the
/// owning command completes); row-tagged bytes with no schema installed
/// are a protocol error rather than silently skipped.
pub struct UnitCodec {
    row_schema: Option<RowSchema>,
    max_header_size: usize,
}

impl UnitCodec {
    /// Create a new codec with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            row_schema: None,
            max_header_size: DEFAULT_MAX_HEADER_SIZE,
        }
    }

    /// Override the maximum header block size.
    #[must_use]
    pub fn with_max_header_size(mut self, max: usize) -> Self {
        self.max_header_size = max;
        self
    }

    /// Install the column schema for an incoming row stream.
    pub fn set_row_schema(&mut self, schema: RowSchema) {
        self.row_schema = Some(schema);
    }

    /// Remove the installed column schema.
    pub fn clear_row_schema(&mut self) {
        self.row_schema = None;
    }

    /// The currently installed row schema, if any.
    #[must_use]
    pub fn row_schema(&self) -> Option<&RowSchema> {
        self.row_schema.as_ref()
    }
}

impl Default for UnitCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for UnitCodec {
    type Item = Unit;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match classify(src) {
            Classification::NeedMore => Ok(None),
            Classification::Invalid => Err(CodecError::Desynchronized { first: src[0] }),
            Classification::Unit(UnitKind::Header) => {
                let Some((content_len, total_len)) = find_header_end(src) else {
                    if src.len() > self.max_header_size {
                        return Err(CodecError::HeaderTooLarge {
                            size: src.len(),
                            max: self.max_header_size,
                        });
                    }
                    return Ok(None);
                };

                let block_bytes = src.split_to(total_len);
                let block = HeaderBlock::parse(&block_bytes[..content_len])?;

                tracing::trace!(
                    command_id = %block.command_id,
                    status = ?block.status,
                    length = total_len,
                    "decoded header block"
                );

                Ok(Some(Unit::Header(block)))
            }
            Classification::Unit(UnitKind::RowData) => {
                let Some(schema) = self.row_schema.as_ref() else {
                    return Err(CodecError::Protocol(ProtocolError::UnexpectedRowData));
                };

                let batch = decode_rows(src, schema)?;
                if batch.rows.is_empty() {
                    // Mid-row; wait without consuming anything.
                    return Ok(None);
                }
                src.advance(batch.consumed);

                tracing::trace!(
                    rows = batch.rows.len(),
                    length = batch.consumed,
                    "decoded row-data unit"
                );

                Ok(Some(Unit::Rows(batch)))
            }
        }
    }
}

impl Encoder<Request> for UnitCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Request, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode(dst);

        tracing::trace!(
            command_id = %item.id,
            verb = %item.verb,
            "encoded request block"
        );

        Ok(())
    }
}
