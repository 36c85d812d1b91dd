//! Wire type tags and decoded column values.

use bytes::Bytes;
use chrono::NaiveDateTime;

use crate::error::ProtocolError;

/// Column wire type, as declared by the `Column-Types` header list.
///
/// The tag determines how a column's bytes are laid out inside a binary
/// row-data block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    /// Length-prefixed UTF-16LE text.
    String,
    /// Length-prefixed UTF-16LE text (same encoding as `String`).
    Text,
    /// 4-byte little-endian signed integer.
    Long,
    /// 1-byte signed integer.
    Byte,
    /// 2-byte little-endian signed integer.
    Word,
    /// 8-byte signed integer, two little-endian 32-bit halves.
    Long8,
    /// 8-byte IEEE-754 double.
    Real,
    /// 4-byte IEEE-754 single.
    Float,
    /// 2-byte little-endian integer interpreted as a boolean.
    Boolean,
    /// Packed calendar date plus seconds-of-day.
    Time,
    /// Packed calendar date plus seconds-of-day.
    Timestamp,
    /// 4-byte little-endian integer, raw seconds.
    Duration,
    /// Length-prefixed raw bytes.
    Blob,
    /// Length-prefixed raw bytes (image payload, passed through).
    Image,
}

impl WireType {
    /// Parse a textual `VK_*` tag.
    pub fn from_tag(tag: &str) -> Result<Self, ProtocolError> {
        match tag {
            "VK_STRING" => Ok(Self::String),
            "VK_TEXT" => Ok(Self::Text),
            "VK_LONG" => Ok(Self::Long),
            "VK_BYTE" => Ok(Self::Byte),
            "VK_WORD" => Ok(Self::Word),
            "VK_LONG8" => Ok(Self::Long8),
            "VK_REAL" => Ok(Self::Real),
            "VK_FLOAT" => Ok(Self::Float),
            "VK_BOOLEAN" => Ok(Self::Boolean),
            "VK_TIME" => Ok(Self::Time),
            "VK_TIMESTAMP" => Ok(Self::Timestamp),
            "VK_DURATION" => Ok(Self::Duration),
            "VK_BLOB" => Ok(Self::Blob),
            "VK_IMAGE" => Ok(Self::Image),
            other => Err(ProtocolError::UnknownWireType(other.to_string())),
        }
    }

    /// The textual tag for this type.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::String => "VK_STRING",
            Self::Text => "VK_TEXT",
            Self::Long => "VK_LONG",
            Self::Byte => "VK_BYTE",
            Self::Word => "VK_WORD",
            Self::Long8 => "VK_LONG8",
            Self::Real => "VK_REAL",
            Self::Float => "VK_FLOAT",
            Self::Boolean => "VK_BOOLEAN",
            Self::Time => "VK_TIME",
            Self::Timestamp => "VK_TIMESTAMP",
            Self::Duration => "VK_DURATION",
            Self::Blob => "VK_BLOB",
            Self::Image => "VK_IMAGE",
        }
    }
}

/// A decoded column value.
///
/// This enum provides a type-safe way to handle 4D values that may be
/// of various types, including NULL.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// NULL value (row status byte 0, or a zeroed date).
    Null,
    /// Boolean value (VK_BOOLEAN).
    Bool(bool),
    /// 8-bit signed integer (VK_BYTE).
    Byte(i8),
    /// 16-bit signed integer (VK_WORD).
    Word(i16),
    /// 32-bit signed integer (VK_LONG).
    Long(i32),
    /// 64-bit signed integer (VK_LONG8).
    Long8(i64),
    /// 32-bit floating point (VK_FLOAT).
    Float(f32),
    /// 64-bit floating point (VK_REAL).
    Real(f64),
    /// String value (VK_STRING, VK_TEXT).
    String(String),
    /// Date-time value (VK_TIME, VK_TIMESTAMP).
    Timestamp(NaiveDateTime),
    /// Raw seconds, not converted (VK_DURATION).
    Duration(i32),
    /// Raw bytes, passed through uninterpreted (VK_BLOB, VK_IMAGE).
    Blob(Bytes),
}

impl Value {
    /// Check if the value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the value as a bool, if it is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the value as an i64, widening any integer variant.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Byte(v) => Some(i64::from(*v)),
            Self::Word(v) => Some(i64::from(*v)),
            Self::Long(v) => Some(i64::from(*v)),
            Self::Long8(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the value as an f64, widening `Float` if needed.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Real(v) => Some(*v),
            Self::Float(v) => Some(f64::from(*v)),
            _ => None,
        }
    }

    /// Get the value as a string slice, if it is text.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// Get the value as bytes, if it is binary.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Blob(v) => Some(v),
            _ => None,
        }
    }

    /// Get the value as a date-time, if it is one.
    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Timestamp(v) => Some(*v),
            _ => None,
        }
    }
}
