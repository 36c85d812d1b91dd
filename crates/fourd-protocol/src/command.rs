//! Command identifiers, verbs and outbound request encoding.
//!
//! Every request opens with `<10-digit command id><space><verb>` followed by
//! `KEY:VALUE` lines and a terminating blank line. The server echoes the
//! command id on the response header, which is what correlates pipelined
//! exchanges.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::CRLF;

/// Client-assigned correlation id for one request/response exchange.
///
/// Rendered on the wire as a 10-digit zero-padded decimal string. Ids start
/// at 1 and are never reused within a connection's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(u32);

impl CommandId {
    /// Number of digits in the wire rendering.
    pub const WIDTH: usize = 10;

    /// Create a command id from its numeric value.
    #[must_use]
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// The numeric value.
    #[must_use]
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Parse the wire rendering (any run of decimal digits).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        s.parse::<u32>().ok().map(Self)
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:010}", self.0)
    }
}

/// Request verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// Open a session.
    Login,
    /// Execute a SQL statement.
    ExecuteStatement,
    /// Fetch a further page of a paginated result set.
    FetchResult,
    /// Close the session.
    Logout,
    /// Ask the peer to close the transport.
    Quit,
}

impl Verb {
    /// The wire word for this verb.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "LOGIN",
            Self::ExecuteStatement => "EXECUTE-STATEMENT",
            Self::FetchResult => "FETCH-RESULT",
            Self::Logout => "LOGOUT",
            Self::Quit => "QUIT",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outbound request block.
#[derive(Debug, Clone)]
pub struct Request {
    /// Correlation id.
    pub id: CommandId,
    /// Request verb.
    pub verb: Verb,
    fields: Vec<(String, String)>,
}

impl Request {
    /// Create an empty request for the given verb.
    #[must_use]
    pub fn new(id: CommandId, verb: Verb) -> Self {
        Self {
            id,
            verb,
            fields: Vec::new(),
        }
    }

    /// Append a `KEY:VALUE` line.
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.fields.push((key.into(), value.to_string()));
        self
    }

    /// Build a LOGIN request.
    #[must_use]
    pub fn login(
        id: CommandId,
        user: &str,
        password: &str,
        os_name: &str,
        os_version: &str,
    ) -> Self {
        Self::new(id, Verb::Login)
            .field("USER-NAME", user)
            .field("USER-PASSWORD", password)
            .field("REPLY-WITH-BASE64-TEXT", "Y")
            .field("PROTOCOL-VERSION", "13.0")
            .field("OS-NAME", os_name)
            .field("OS-VERSION", os_version)
    }

    /// Build an EXECUTE-STATEMENT request.
    ///
    /// `first_page_size` bounds the number of rows the server sends before
    /// the client must fetch further pages.
    #[must_use]
    pub fn execute(id: CommandId, statement: &str, first_page_size: u32) -> Self {
        Self::new(id, Verb::ExecuteStatement)
            .field("STATEMENT", statement)
            .field("OUTPUT-MODE", "Debug")
            .field("PREFERRED-IMAGE-TYPES", "jpg png")
            .field("FIRST-PAGE-SIZE", first_page_size)
            .field("FULL-ERROR-STACK", "Y")
    }

    /// Build a FETCH-RESULT request for a further page.
    ///
    /// Row indices are 1-based and inclusive.
    #[must_use]
    pub fn fetch(
        id: CommandId,
        statement_id: &str,
        command_index: u32,
        first_row: u64,
        last_row: u64,
    ) -> Self {
        Self::new(id, Verb::FetchResult)
            .field("STATEMENT-ID", statement_id)
            .field("COMMAND-INDEX", command_index)
            .field("OUTPUT-MODE", "Debug")
            .field("FIRST-ROW-INDEX", first_row)
            .field("LAST-ROW-INDEX", last_row)
            .field("FULL-ERROR-STACK", "Y")
    }

    /// Build a LOGOUT request (empty body).
    #[must_use]
    pub fn logout(id: CommandId) -> Self {
        Self::new(id, Verb::Logout)
    }

    /// Build a QUIT request (empty body).
    #[must_use]
    pub fn quit(id: CommandId) -> Self {
        Self::new(id, Verb::Quit)
    }

    /// Encode the request block into `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_slice(format!("{} {}", self.id, self.verb).as_bytes());
        dst.put_slice(CRLF.as_bytes());
        for (key, value) in &self.fields {
            dst.put_slice(key.as_bytes());
            dst.put_u8(b':');
            dst.put_slice(value.as_bytes());
            dst.put_slice(CRLF.as_bytes());
        }
        dst.put_slice(CRLF.as_bytes());
    }

    /// Encode the request block into a freshly allocated buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_command_id_rendering() {
        assert_eq!(CommandId::new(1).to_string(), "0000000001");
        assert_eq!(CommandId::new(42).to_string(), "0000000042");
        assert_eq!(CommandId::new(1_234_567_890).to_string(), "1234567890");
    }

    #[test]
    fn test_command_id_parse() {
        assert_eq!(CommandId::parse("0000000007"), Some(CommandId::new(7)));
        assert_eq!(CommandId::parse("12"), Some(CommandId::new(12)));
        assert_eq!(CommandId::parse("x"), None);
    }

    #[test]
    fn test_login_request_wire_shape() {
        let req = Request::login(CommandId::new(1), "Administrator", "", "linux", "6.1");
        let text = String::from_utf8(req.to_bytes().to_vec()).unwrap();
        assert!(text.starts_with("0000000001 LOGIN\r\n"));
        assert!(text.contains("USER-NAME:Administrator\r\n"));
        assert!(text.contains("USER-PASSWORD:\r\n"));
        assert!(text.contains("REPLY-WITH-BASE64-TEXT:Y\r\n"));
        assert!(text.contains("PROTOCOL-VERSION:13.0\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_fetch_request_wire_shape() {
        let req = Request::fetch(CommandId::new(3), "17", 0, 101, 200);
        let text = String::from_utf8(req.to_bytes().to_vec()).unwrap();
        assert!(text.starts_with("0000000003 FETCH-RESULT\r\n"));
        assert!(text.contains("STATEMENT-ID:17\r\n"));
        assert!(text.contains("FIRST-ROW-INDEX:101\r\n"));
        assert!(text.contains("LAST-ROW-INDEX:200\r\n"));
    }

    #[test]
    fn test_empty_body_requests() {
        let text = String::from_utf8(Request::quit(CommandId::new(9)).to_bytes().to_vec()).unwrap();
        assert_eq!(text, "0000000009 QUIT\r\n\r\n");
    }
}
