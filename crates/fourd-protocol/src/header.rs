//! Header block decoding and typed promotion.
//!
//! A header block is line 1 `<10-digit command id><space><status word>`
//! followed by `Key: Value` lines. Raw parsing applies, in order: `-Base64`
//! suffix stripping with value decoding, `Stack-Error*` tail re-decoding,
//! list splitting for the three column-list keys, and finally hyphen
//! removal from every key. The engine then promotes the fields it depends
//! on into [`ResponseHeader`] before any other component touches them.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::command::CommandId;
use crate::error::ProtocolError;
use crate::types::WireType;

/// Keys whose values are lists (checked before hyphen removal).
const LIST_KEYS: [&str; 3] = ["Column-Types", "Column-Aliases", "Column-Updateability"];

/// Suffix marking a base64-encoded value.
const BASE64_SUFFIX: &str = "-Base64";

/// Header status word from line 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// Command succeeded.
    Ok,
    /// Command failed; error fields describe the failure.
    Error,
    /// Any other status word, carried verbatim.
    Other(String),
}

impl Status {
    fn from_word(word: &str) -> Self {
        match word {
            "OK" => Self::Ok,
            "ERROR" => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }

    /// Whether this is the ERROR status.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }
}

/// A decoded header field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    /// Scalar value.
    Text(String),
    /// List value (one of the column-list keys).
    List(Vec<String>),
}

impl HeaderValue {
    /// The scalar form, if this is one.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::List(_) => None,
        }
    }

    /// The list form, if this is one.
    #[must_use]
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(items) => Some(items),
            Self::Text(_) => None,
        }
    }
}

/// One parsed header block: command id, status and the ordered field map.
///
/// Keys are stored after hyphen removal (`Column-Types` → `ColumnTypes`),
/// in wire order.
#[derive(Debug, Clone)]
pub struct HeaderBlock {
    /// Command id echoed from the request.
    pub command_id: CommandId,
    /// Status word from line 1.
    pub status: Status,
    fields: Vec<(String, HeaderValue)>,
}

impl HeaderBlock {
    /// Parse one header block (excluding the double-CRLF terminator).
    pub fn parse(src: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(src).map_err(|_| ProtocolError::InvalidEncoding)?;
        let mut lines = text.split("\r\n");

        let first = lines.next().unwrap_or_default();
        let (command_id, status) = parse_first_line(first)?;

        let mut fields = Vec::new();
        for line in lines {
            let Some(colon) = line.find(':') else {
                continue;
            };
            let mut key = line[..colon].trim().to_string();
            let mut value = line[colon + 1..].trim().to_string();

            if let Some(stripped) = key.strip_suffix(BASE64_SUFFIX) {
                key = stripped.to_string();
                value = decode_base64_text(&value)?;
            }

            if key.starts_with("Stack-Error") {
                value = decode_stack_error(&value)?;
            }

            let value = if LIST_KEYS.contains(&key.as_str()) {
                HeaderValue::List(split_list(&value))
            } else {
                HeaderValue::Text(value)
            };

            fields.push((key.replace('-', ""), value));
        }

        Ok(Self {
            command_id,
            status,
            fields,
        })
    }

    /// Look up a field by its hyphen-stripped key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Scalar field lookup.
    #[must_use]
    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(HeaderValue::as_text)
    }

    /// List field lookup.
    #[must_use]
    pub fn list(&self, key: &str) -> Option<&[String]> {
        self.get(key).and_then(HeaderValue::as_list)
    }

    /// Field keys in wire order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }
}

fn parse_first_line(line: &str) -> Result<(CommandId, Status), ProtocolError> {
    let malformed = || ProtocolError::MalformedHeader(line.to_string());

    let (digits, word) = line.split_once(' ').ok_or_else(malformed)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    if word.is_empty() || !word.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        return Err(malformed());
    }
    let id = CommandId::parse(digits).ok_or_else(malformed)?;
    Ok((id, Status::from_word(word)))
}

fn decode_base64_text(value: &str) -> Result<String, ProtocolError> {
    let bytes = BASE64.decode(value.trim())?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Re-decode a `Stack-Error*` value.
///
/// The wire shape is `<word> <number> <number> <base64 text>`; the first
/// three tokens pass through and the remainder is base64 text. Values that
/// do not match the shape pass through untouched.
fn decode_stack_error(value: &str) -> Result<String, ProtocolError> {
    let mut parts = value.splitn(4, ' ');
    let (Some(word), Some(n1), Some(n2), Some(tail)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Ok(value.to_string());
    };
    if word.is_empty()
        || !n1.bytes().all(|b| b.is_ascii_digit())
        || !n2.bytes().all(|b| b.is_ascii_digit())
    {
        return Ok(value.to_string());
    }
    Ok(format!("{word} {n1} {n2} {}", decode_base64_text(tail)?))
}

/// Split a list-valued header field.
///
/// Bracketed form `[tok][tok]...` when brackets are present, otherwise
/// single-space separation.
fn split_list(value: &str) -> Vec<String> {
    if value.contains('[') {
        let mut items = Vec::new();
        let mut rest = value;
        while let Some(open) = rest.find('[') {
            let Some(close) = rest[open..].find(']') else {
                break;
            };
            let token = &rest[open + 1..open + close];
            if !token.is_empty() {
                items.push(token.to_string());
            }
            rest = &rest[open + close + 1..];
        }
        items
    } else {
        value.split(' ').map(str::to_string).collect()
    }
}

/// Result kind declared by the `ResultType` header field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultKind {
    /// A paginated row result.
    ResultSet,
    /// A row-less statement outcome (INSERT/UPDATE/DELETE).
    UpdateCount,
    /// An error outcome, or a header with no recognizable result type.
    Error,
}

/// Server-reported error: numeric code plus a possibly multi-segment
/// message (`ErrorDescription` and any `StackError*` lines).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    /// Server error code.
    pub code: i32,
    /// Aggregated error message.
    pub message: String,
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "server error {}: {}", self.code, self.message)
    }
}

/// One result-set column as declared by the header's column lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// Column name (`Column-Aliases`).
    pub name: String,
    /// Column wire type (`Column-Types`).
    pub wire_type: WireType,
    /// Whether the column is updatable (`Column-Updateability` = `Y`).
    pub updatable: bool,
}

/// Typed promotion of the header fields the engine depends on.
#[derive(Debug, Clone)]
pub struct ResponseHeader {
    /// Command id echoed from the request.
    pub command_id: CommandId,
    /// Status word from line 1.
    pub status: Status,
    /// Declared result kind.
    pub kind: ResultKind,
    /// Server-assigned statement id, correlating fetch continuations.
    pub statement_id: Option<String>,
    /// Number of columns (`CommandCount`).
    pub column_count: Option<u64>,
    /// Declared total row count of the full result.
    pub row_count: Option<u64>,
    /// Rows the server sent in this page.
    pub row_count_sent: Option<u64>,
    /// Declared columns, in order. Empty for row-less results.
    pub columns: Vec<ColumnDef>,
    /// Affected row count for Update-Count results, when declared.
    pub affected_rows: Option<u64>,
    /// Server error, present exactly when `status` is ERROR.
    pub error: Option<ServerError>,
}

impl ResponseHeader {
    /// Promote a raw header block.
    pub fn from_block(block: &HeaderBlock) -> Result<Self, ProtocolError> {
        if block.status.is_error() {
            return Ok(Self {
                command_id: block.command_id,
                status: Status::Error,
                kind: ResultKind::Error,
                statement_id: None,
                column_count: None,
                row_count: None,
                row_count_sent: None,
                columns: Vec::new(),
                affected_rows: None,
                error: Some(promote_error(block)),
            });
        }

        let kind = match block.text("ResultType") {
            Some("Result-Set") => ResultKind::ResultSet,
            Some("Update-Count") => ResultKind::UpdateCount,
            _ => ResultKind::Error,
        };

        let columns = if kind == ResultKind::ResultSet {
            promote_columns(block)?
        } else {
            Vec::new()
        };

        Ok(Self {
            command_id: block.command_id,
            status: block.status.clone(),
            kind,
            statement_id: block.text("StatementID").map(str::to_string),
            column_count: parse_count(block, "CommandCount")?,
            row_count: parse_count(block, "RowCount")?,
            row_count_sent: parse_count(block, "RowCountSent")?,
            columns,
            affected_rows: parse_count(block, "UpdateCount")?,
            error: None,
        })
    }
}

fn parse_count(block: &HeaderBlock, key: &'static str) -> Result<Option<u64>, ProtocolError> {
    match block.text(key) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ProtocolError::InvalidField {
                field: key,
                value: raw.to_string(),
            }),
    }
}

fn promote_columns(block: &HeaderBlock) -> Result<Vec<ColumnDef>, ProtocolError> {
    let types = block
        .list("ColumnTypes")
        .ok_or(ProtocolError::MissingField("ColumnTypes"))?;
    let aliases = block
        .list("ColumnAliases")
        .ok_or(ProtocolError::MissingField("ColumnAliases"))?;
    if aliases.len() != types.len() {
        return Err(ProtocolError::InvalidField {
            field: "ColumnAliases",
            value: format!("{} aliases for {} types", aliases.len(), types.len()),
        });
    }
    // Updateability defaults to read-only when the list is absent or short.
    let updatable = block.list("ColumnUpdateability").unwrap_or(&[]);

    types
        .iter()
        .zip(aliases)
        .enumerate()
        .map(|(i, (tag, name))| {
            Ok(ColumnDef {
                name: name.clone(),
                wire_type: WireType::from_tag(tag)?,
                updatable: updatable.get(i).is_some_and(|u| u == "Y"),
            })
        })
        .collect()
}

fn promote_error(block: &HeaderBlock) -> ServerError {
    let code = block
        .text("ErrorCode")
        .and_then(|raw| raw.parse::<i32>().ok())
        .unwrap_or(0);
    let mut message = block.text("ErrorDescription").unwrap_or_default().to_string();
    for key in ["StackError1", "StackError2", "StackError3"] {
        if let Some(segment) = block.text(key) {
            message.push('\n');
            message.push_str(segment);
        }
    }
    ServerError { code, message }
}
