//! Binary row decoding.
//!
//! A row-data block is a raw run of rows packed back-to-back with no
//! inter-row delimiter; its extent is implied solely by the declared column
//! schema. Every field opens with a status byte: 0 null, 1 value, 2 a
//! 4-byte server error code (fatal to the whole pass). A row truncated by
//! the end of the buffer is discarded without consuming anything, so the
//! caller can retry once more bytes arrive.

use bytes::{Buf, Bytes};
use chrono::{NaiveDate, NaiveDateTime};

use crate::error::ProtocolError;
use crate::header::{ColumnDef, ResponseHeader};
use crate::types::{Value, WireType};

/// Name of the synthetic record-number column the server prepends when any
/// declared column is updatable.
pub const RECORD_NUMBER_COLUMN: &str = "__RECORDNR__";

/// Field status byte: value is null.
const STATUS_NULL: u8 = 0;
/// Field status byte: a typed value follows.
const STATUS_VALUE: u8 = 1;
/// Field status byte: a 4-byte server error code follows.
const STATUS_ERROR: u8 = 2;

/// The effective column schema for decoding one result set's row stream.
///
/// Built from a Result-Set header's column lists, with the implicit
/// [`RECORD_NUMBER_COLUMN`] prepended when any column is updatable.
#[derive(Debug, Clone)]
pub struct RowSchema {
    /// Columns in wire order, including the synthetic record-number column.
    pub columns: Vec<ColumnDef>,
}

impl RowSchema {
    /// Build the schema from a promoted Result-Set header.
    #[must_use]
    pub fn from_header(header: &ResponseHeader) -> Self {
        Self::from_columns(&header.columns)
    }

    /// Build the schema from a declared column list.
    #[must_use]
    pub fn from_columns(declared: &[ColumnDef]) -> Self {
        let mut columns = Vec::with_capacity(declared.len() + 1);
        if declared.iter().any(|c| c.updatable) {
            columns.push(ColumnDef {
                name: RECORD_NUMBER_COLUMN.to_string(),
                wire_type: WireType::Long,
                updatable: false,
            });
        }
        columns.extend_from_slice(declared);
        Self { columns }
    }

    /// Number of columns per row, including the synthetic one.
    #[must_use]
    pub fn width(&self) -> usize {
        self.columns.len()
    }
}

/// Outcome of decoding a single row.
///
/// Incompleteness never shares a path with a genuine decode error.
#[derive(Debug)]
pub enum RowDecode {
    /// A full row was decoded; the second element is the bytes consumed.
    Complete(Vec<Value>, usize),
    /// The buffer ended mid-row; nothing was consumed.
    Incomplete,
    /// The row stream is undecodable from here on.
    Fatal(ProtocolError),
}

/// A decoded run of rows and the exact prefix length it occupied.
#[derive(Debug, Default)]
pub struct RowBatch {
    /// Fully decoded rows, in order. Values follow the schema's columns.
    pub rows: Vec<Vec<Value>>,
    /// Byte offset of the end of the last fully decoded row.
    ///
    /// The caller slices the buffer here; a trailing partial row is left
    /// in place untouched.
    pub consumed: usize,
}

/// Decode as many complete rows as the buffer holds.
pub fn decode_rows(src: &[u8], schema: &RowSchema) -> Result<RowBatch, ProtocolError> {
    let mut batch = RowBatch::default();
    loop {
        match decode_row(&src[batch.consumed..], schema) {
            RowDecode::Complete(row, len) => {
                batch.rows.push(row);
                batch.consumed += len;
            }
            RowDecode::Incomplete => return Ok(batch),
            RowDecode::Fatal(err) => return Err(err),
        }
    }
}

/// Decode one row from the front of `src`.
#[must_use]
pub fn decode_row(src: &[u8], schema: &RowSchema) -> RowDecode {
    let mut cur = src;
    let mut row = Vec::with_capacity(schema.width());

    for column in &schema.columns {
        if cur.remaining() < 1 {
            return RowDecode::Incomplete;
        }
        match cur.get_u8() {
            STATUS_NULL => row.push(Value::Null),
            STATUS_VALUE => match decode_value(&mut cur, column.wire_type) {
                ValueDecode::Value(value) => row.push(value),
                ValueDecode::Incomplete => return RowDecode::Incomplete,
            },
            STATUS_ERROR => {
                if cur.remaining() < 4 {
                    return RowDecode::Incomplete;
                }
                let code = cur.get_i32_le();
                return RowDecode::Fatal(ProtocolError::RowServerError { code });
            }
            status => return RowDecode::Fatal(ProtocolError::UnrecognizedRowStatus { status }),
        }
    }

    RowDecode::Complete(row, src.len() - cur.remaining())
}

enum ValueDecode {
    Value(Value),
    Incomplete,
}

fn decode_value(cur: &mut &[u8], wire_type: WireType) -> ValueDecode {
    macro_rules! need {
        ($n:expr) => {
            if cur.remaining() < $n {
                return ValueDecode::Incomplete;
            }
        };
    }

    let value = match wire_type {
        WireType::String | WireType::Text => {
            need!(4);
            // Length is in UTF-16 code units; the sign bit is noise.
            let units = cur.get_i32_le().unsigned_abs() as usize;
            need!(units * 2);
            let mut code_units = Vec::with_capacity(units);
            for _ in 0..units {
                code_units.push(cur.get_u16_le());
            }
            Value::String(String::from_utf16_lossy(&code_units))
        }
        WireType::Long => {
            need!(4);
            Value::Long(cur.get_i32_le())
        }
        WireType::Byte => {
            need!(1);
            Value::Byte(cur.get_i8())
        }
        WireType::Word => {
            need!(2);
            Value::Word(cur.get_i16_le())
        }
        WireType::Long8 => {
            // Two LE 32-bit halves, low then high; identical to a plain LE
            // i64 read. The observed implementation's combine arithmetic is
            // ambiguous and this form is unverified against a live server.
            need!(8);
            let low = cur.get_u32_le();
            let high = cur.get_u32_le();
            Value::Long8(((i64::from(high as i32)) << 32) | i64::from(low))
        }
        WireType::Real => {
            need!(8);
            Value::Real(cur.get_f64_le())
        }
        WireType::Float => {
            // Wire width is 4 bytes. The observed implementation read 8 but
            // advanced 4, which cannot be right for any following column;
            // the 4-byte form is used here and is unverified against a
            // live server.
            need!(4);
            Value::Float(cur.get_f32_le())
        }
        WireType::Boolean => {
            need!(2);
            Value::Bool(cur.get_i16_le() != 0)
        }
        WireType::Time | WireType::Timestamp => {
            need!(8);
            let year = cur.get_u16_le();
            let month = cur.get_u8();
            let day = cur.get_u8();
            let seconds = cur.get_i32_le();
            decode_timestamp(year, month, day, seconds)
        }
        WireType::Duration => {
            need!(4);
            Value::Duration(cur.get_i32_le())
        }
        WireType::Blob | WireType::Image => {
            need!(4);
            let len = cur.get_u32_le() as usize;
            need!(len);
            let bytes = Bytes::copy_from_slice(&cur[..len]);
            cur.advance(len);
            Value::Blob(bytes)
        }
    };

    ValueDecode::Value(value)
}

/// Combine packed date-time fields; a zeroed or out-of-range calendar date
/// decodes to NULL (4D's "no date").
fn decode_timestamp(year: u16, month: u8, day: u8, seconds: i32) -> Value {
    let date = NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day));
    let time = chrono::NaiveTime::from_num_seconds_from_midnight_opt(seconds.max(0) as u32, 0);
    match (date, time) {
        (Some(date), Some(time)) => Value::Timestamp(NaiveDateTime::new(date, time)),
        _ => Value::Null,
    }
}
