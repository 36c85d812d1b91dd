//! Protocol unit classification and extraction.
//!
//! The wire format has no uniform length-prefixed framing. Header blocks
//! are delimited by a double CRLF; row-data blocks are raw binary runs with
//! no delimiter at all, their extent implied solely by the declared row and
//! column counts. Classification therefore inspects only a small fixed
//! lookahead of the accumulating receive buffer.

use crate::BLOCK_TERMINATOR;

/// Maximum number of leading bytes inspected to classify the next unit.
pub const LOOKAHEAD: usize = 32;

/// Row field status tags; any leading byte in this range marks a row-data
/// block (header blocks always start with an ASCII digit).
const ROW_STATUS_MAX: u8 = 2;

/// Kind of protocol unit at the front of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// Textual header block, `<digits><space><word>` then `Key: Value` lines.
    Header,
    /// Binary row-data block belonging to the last dispatched command.
    RowData,
}

/// Outcome of classifying the buffer prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The next unit's kind is known.
    Unit(UnitKind),
    /// Too few bytes to decide; wait for more without consuming any.
    NeedMore,
    /// The prefix matches neither unit kind; the stream is desynchronized.
    Invalid,
}

/// Classify the next protocol unit from the buffer prefix.
///
/// Inspects at most [`LOOKAHEAD`] bytes and never consumes anything.
#[must_use]
pub fn classify(buf: &[u8]) -> Classification {
    let Some(&first) = buf.first() else {
        return Classification::NeedMore;
    };

    if first <= ROW_STATUS_MAX {
        return Classification::Unit(UnitKind::RowData);
    }
    if !first.is_ascii_digit() {
        return Classification::Invalid;
    }

    // Digits, then a single space, then at least one word character.
    let window = &buf[..buf.len().min(LOOKAHEAD)];
    let digits = window.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == window.len() {
        return if window.len() < LOOKAHEAD {
            Classification::NeedMore
        } else {
            Classification::Invalid
        };
    }
    if window[digits] != b' ' {
        return Classification::Invalid;
    }
    match window.get(digits + 1) {
        None => Classification::NeedMore,
        Some(&b) if b.is_ascii_alphanumeric() || b == b'_' => {
            Classification::Unit(UnitKind::Header)
        }
        Some(_) => Classification::Invalid,
    }
}

/// Locate the end of a header block.
///
/// Returns `(content_len, total_len)` where `content_len` excludes the
/// double-CRLF terminator and `total_len` includes it, or `None` if the
/// terminator has not arrived yet.
#[must_use]
pub fn find_header_end(buf: &[u8]) -> Option<(usize, usize)> {
    buf.windows(BLOCK_TERMINATOR.len())
        .position(|w| w == BLOCK_TERMINATOR)
        .map(|pos| (pos, pos + BLOCK_TERMINATOR.len()))
}
