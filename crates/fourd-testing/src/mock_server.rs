//! Mock 4D SQL server for unit testing.
//!
//! This module provides a mock server speaking the 4D SQL wire protocol so
//! driver behavior can be tested without a real database instance.
//!
//! ## Features
//!
//! - Simulates the LOGIN/LOGOUT/QUIT session handshake
//! - Configurable responses for SQL statements
//! - Pagination: results can be served in pages to force FETCH-RESULT
//!   continuations
//! - Support for multiple concurrent connections
//!
//! ## Example
//!
//! ```rust,ignore
//! use fourd_testing::mock_server::{Mock4dServer, MockColumn, MockResponse, MockValue};
//!
//! #[tokio::test]
//! async fn test_query() {
//!     let server = Mock4dServer::builder()
//!         .with_response(
//!             "SELECT 1",
//!             MockResponse::result_set(
//!                 vec![MockColumn::long("n")],
//!                 vec![vec![MockValue::Long(1)]],
//!             ),
//!         )
//!         .build()
//!         .await
//!         .unwrap();
//!
//!     // Connect your client to server.port()...
//! }
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, broadcast};

use fourd_protocol::WireType;

/// Error type for mock server operations.
#[derive(Debug, Error)]
pub enum MockServerError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed client request.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Result type for mock server operations.
pub type Result<T> = std::result::Result<T, MockServerError>;

/// Scalar value for mock rows.
#[derive(Debug, Clone)]
pub enum MockValue {
    /// NULL (row status byte 0, no payload).
    Null,
    /// Boolean, encoded as a 16-bit integer.
    Bool(bool),
    /// 32-bit integer.
    Long(i32),
    /// 64-bit integer.
    Long8(i64),
    /// 64-bit float.
    Real(f64),
    /// Text, encoded as UTF-16LE with a unit-count prefix.
    Text(String),
    /// Binary data with a length prefix.
    Blob(Vec<u8>),
    /// A per-value server error (row status byte 2); aborts decoding on
    /// the client side.
    ErrorCode(i32),
}

impl MockValue {
    /// Encode this value as one row cell: status byte plus payload.
    fn encode(&self, dst: &mut BytesMut) {
        match self {
            Self::Null => dst.put_u8(0),
            Self::Bool(v) => {
                dst.put_u8(1);
                dst.put_i16_le(i16::from(*v));
            }
            Self::Long(v) => {
                dst.put_u8(1);
                dst.put_i32_le(*v);
            }
            Self::Long8(v) => {
                dst.put_u8(1);
                dst.put_i64_le(*v);
            }
            Self::Real(v) => {
                dst.put_u8(1);
                dst.put_f64_le(*v);
            }
            Self::Text(s) => {
                dst.put_u8(1);
                let units: Vec<u16> = s.encode_utf16().collect();
                dst.put_i32_le(units.len() as i32);
                for unit in units {
                    dst.put_u16_le(unit);
                }
            }
            Self::Blob(data) => {
                dst.put_u8(1);
                dst.put_u32_le(data.len() as u32);
                dst.put_slice(data);
            }
            Self::ErrorCode(code) => {
                dst.put_u8(2);
                dst.put_i32_le(*code);
            }
        }
    }
}

/// Mock column definition.
#[derive(Debug, Clone)]
pub struct MockColumn {
    /// Column alias.
    pub name: String,
    /// Declared wire type.
    pub wire_type: WireType,
    /// Whether the column is declared updatable; any updatable column
    /// makes every row carry a leading record number.
    pub updatable: bool,
}

impl MockColumn {
    /// Create a new column definition.
    pub fn new(name: impl Into<String>, wire_type: WireType) -> Self {
        Self {
            name: name.into(),
            wire_type,
            updatable: false,
        }
    }

    /// Create a VK_LONG column.
    pub fn long(name: impl Into<String>) -> Self {
        Self::new(name, WireType::Long)
    }

    /// Create a VK_LONG8 column.
    pub fn long8(name: impl Into<String>) -> Self {
        Self::new(name, WireType::Long8)
    }

    /// Create a VK_STRING column.
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, WireType::String)
    }

    /// Create a VK_REAL column.
    pub fn real(name: impl Into<String>) -> Self {
        Self::new(name, WireType::Real)
    }

    /// Create a VK_BOOLEAN column.
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, WireType::Boolean)
    }

    /// Create a VK_BLOB column.
    pub fn blob(name: impl Into<String>) -> Self {
        Self::new(name, WireType::Blob)
    }

    /// Set the updatable flag.
    #[must_use]
    pub fn with_updatable(mut self, updatable: bool) -> Self {
        self.updatable = updatable;
        self
    }
}

/// Mock response configuration.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Return a result set, optionally paginated.
    ResultSet {
        /// Column definitions.
        columns: Vec<MockColumn>,
        /// Row data.
        rows: Vec<Vec<MockValue>>,
        /// Rows served per page; `None` serves whatever the client asked
        /// for in one page.
        page_size: Option<usize>,
    },

    /// Return an Update-Count result.
    Affected(u64),

    /// Return an error block.
    Error {
        /// Error code.
        code: i32,
        /// Error description.
        message: String,
    },
}

impl MockResponse {
    /// Create a single-page result set response.
    pub fn result_set(columns: Vec<MockColumn>, rows: Vec<Vec<MockValue>>) -> Self {
        Self::ResultSet {
            columns,
            rows,
            page_size: None,
        }
    }

    /// Create a paginated result set response.
    pub fn paginated(
        columns: Vec<MockColumn>,
        rows: Vec<Vec<MockValue>>,
        page_size: usize,
    ) -> Self {
        Self::ResultSet {
            columns,
            rows,
            page_size: Some(page_size),
        }
    }

    /// Create a rows-affected response.
    pub fn affected(count: u64) -> Self {
        Self::Affected(count)
    }

    /// Create an error response.
    pub fn error(code: i32, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }
}

/// Configuration for the mock server.
#[derive(Default)]
pub struct MockServerConfig {
    /// Responses for specific statements.
    responses: HashMap<String, MockResponse>,
    /// Response for unmatched statements.
    default_response: Option<MockResponse>,
    /// When set, LOGIN is rejected with this error.
    login_error: Option<(i32, String)>,
}

/// Builder for [`Mock4dServer`].
pub struct MockServerBuilder {
    config: MockServerConfig,
}

impl MockServerBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: MockServerConfig {
                responses: HashMap::new(),
                default_response: Some(MockResponse::affected(0)),
                login_error: None,
            },
        }
    }

    /// Add a response for a specific statement.
    pub fn with_response(mut self, statement: impl Into<String>, response: MockResponse) -> Self {
        self.config.responses.insert(statement.into(), response);
        self
    }

    /// Set the response for unmatched statements.
    pub fn with_default_response(mut self, response: MockResponse) -> Self {
        self.config.default_response = Some(response);
        self
    }

    /// Reject every LOGIN with the given error.
    pub fn with_login_error(mut self, code: i32, message: impl Into<String>) -> Self {
        self.config.login_error = Some((code, message.into()));
        self
    }

    /// Build and start the mock server.
    pub async fn build(self) -> Result<Mock4dServer> {
        Mock4dServer::start(self.config).await
    }
}

impl Default for MockServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A mock 4D SQL server for testing.
///
/// Listens on a random loopback port, accepts any number of connections
/// and answers statements from its configured response table.
pub struct Mock4dServer {
    addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    connection_count: Arc<Mutex<usize>>,
}

impl Mock4dServer {
    /// Create a new builder for the mock server.
    pub fn builder() -> MockServerBuilder {
        MockServerBuilder::new()
    }

    /// Start the mock server on an available port.
    pub async fn start(config: MockServerConfig) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let config = Arc::new(config);
        let connection_count = Arc::new(Mutex::new(0usize));

        let server = Self {
            addr,
            shutdown_tx: shutdown_tx.clone(),
            connection_count: Arc::clone(&connection_count),
        };

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _peer_addr)) => {
                                let config = Arc::clone(&config);
                                let count = Arc::clone(&connection_count);
                                tokio::spawn(async move {
                                    *count.lock().await += 1;
                                    if let Err(e) = handle_connection(stream, config).await {
                                        tracing::debug!("connection error: {e}");
                                    }
                                    let mut c = count.lock().await;
                                    *c = c.saturating_sub(1);
                                });
                            }
                            Err(e) => {
                                tracing::error!("accept error: {e}");
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        Ok(server)
    }

    /// Get the server's listening address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the host string for connection configuration.
    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    /// Get the port number.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Get the current connection count.
    pub async fn connection_count(&self) -> usize {
        *self.connection_count.lock().await
    }

    /// Stop the server.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl Drop for Mock4dServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One parsed client request block.
struct ClientRequest {
    command_id: String,
    verb: String,
    fields: HashMap<String, String>,
}

/// Result set remembered across FETCH-RESULT continuations.
struct StoredStatement {
    columns: Vec<MockColumn>,
    rows: Vec<Vec<MockValue>>,
    page_size: Option<usize>,
}

/// Handle a single client connection.
async fn handle_connection(mut stream: TcpStream, config: Arc<MockServerConfig>) -> Result<()> {
    let mut buf = Vec::new();
    let mut statements: HashMap<String, StoredStatement> = HashMap::new();
    let mut next_statement_id = 1u32;

    loop {
        let request = match read_request(&mut stream, &mut buf).await {
            Ok(Some(request)) => request,
            Ok(None) => break,
            Err(e) => return Err(e),
        };
        tracing::trace!(id = %request.command_id, verb = %request.verb, "mock request");

        match request.verb.as_str() {
            "LOGIN" => {
                let response = match &config.login_error {
                    Some((code, message)) => error_block(&request.command_id, *code, message),
                    None => ok_block(&request.command_id),
                };
                stream.write_all(&response).await?;
            }
            "EXECUTE-STATEMENT" => {
                let statement = request.fields.get("STATEMENT").cloned().unwrap_or_default();
                let response = config
                    .responses
                    .get(&statement)
                    .or(config.default_response.as_ref())
                    .cloned()
                    .unwrap_or(MockResponse::Affected(0));

                match response {
                    MockResponse::Affected(count) => {
                        let block = format!(
                            "{} OK\r\nResultType:Update-Count\r\nUpdate-Count:{count}\r\n\r\n",
                            request.command_id
                        );
                        stream.write_all(block.as_bytes()).await?;
                    }
                    MockResponse::Error { code, message } => {
                        stream
                            .write_all(&error_block(&request.command_id, code, &message))
                            .await?;
                    }
                    MockResponse::ResultSet {
                        columns,
                        rows,
                        page_size,
                    } => {
                        let statement_id = next_statement_id.to_string();
                        next_statement_id += 1;

                        let requested: usize = request
                            .fields
                            .get("FIRST-PAGE-SIZE")
                            .and_then(|v| v.parse().ok())
                            .unwrap_or(usize::MAX);
                        let sent = rows
                            .len()
                            .min(requested)
                            .min(page_size.unwrap_or(usize::MAX));

                        let payload = result_page(
                            &request.command_id,
                            &statement_id,
                            &columns,
                            &rows,
                            0,
                            sent,
                        );
                        statements.insert(
                            statement_id,
                            StoredStatement {
                                columns,
                                rows,
                                page_size,
                            },
                        );
                        stream.write_all(&payload).await?;
                    }
                }
            }
            "FETCH-RESULT" => {
                let statement_id = request
                    .fields
                    .get("STATEMENT-ID")
                    .cloned()
                    .unwrap_or_default();
                let Some(stored) = statements.get(&statement_id) else {
                    stream
                        .write_all(&error_block(&request.command_id, 1802, "unknown statement"))
                        .await?;
                    continue;
                };

                let first: usize = request
                    .fields
                    .get("FIRST-ROW-INDEX")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1);
                let last: usize = request
                    .fields
                    .get("LAST-ROW-INDEX")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(usize::MAX);

                let start = first.saturating_sub(1).min(stored.rows.len());
                let mut sent = last.min(stored.rows.len()).saturating_sub(start);
                if let Some(page_size) = stored.page_size {
                    sent = sent.min(page_size);
                }

                let payload = result_page(
                    &request.command_id,
                    &statement_id,
                    &stored.columns,
                    &stored.rows,
                    start,
                    sent,
                );
                stream.write_all(&payload).await?;
            }
            "LOGOUT" => {
                stream.write_all(&ok_block(&request.command_id)).await?;
            }
            "QUIT" => break,
            other => {
                return Err(MockServerError::Protocol(format!("unknown verb {other}")));
            }
        }
    }

    Ok(())
}

/// Read one request block; `None` on clean disconnect.
async fn read_request(
    stream: &mut TcpStream,
    buf: &mut Vec<u8>,
) -> Result<Option<ClientRequest>> {
    let block = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let block: Vec<u8> = buf.drain(..pos + 4).collect();
            break block;
        }
        let mut chunk = [0u8; 1024];
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(MockServerError::Protocol(
                "disconnect mid-request".to_string(),
            ));
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let text = String::from_utf8(block)
        .map_err(|_| MockServerError::Protocol("request is not UTF-8".to_string()))?;
    let mut lines = text.split("\r\n");
    let first = lines
        .next()
        .ok_or_else(|| MockServerError::Protocol("empty request".to_string()))?;
    let (command_id, verb) = first
        .split_once(' ')
        .ok_or_else(|| MockServerError::Protocol(format!("bad request line: {first}")))?;

    let mut fields = HashMap::new();
    for line in lines {
        if let Some((key, value)) = line.split_once(':') {
            fields.insert(key.to_string(), value.to_string());
        }
    }

    Ok(Some(ClientRequest {
        command_id: command_id.to_string(),
        verb: verb.to_string(),
        fields,
    }))
}

fn ok_block(command_id: &str) -> Vec<u8> {
    format!("{command_id} OK\r\n\r\n").into_bytes()
}

fn error_block(command_id: &str, code: i32, message: &str) -> Vec<u8> {
    format!(
        "{command_id} ERROR\r\nError-Code:{code}\r\nError-Description:{message}\r\n\r\n"
    )
    .into_bytes()
}

/// Encode one result page: the header block followed by the raw row run.
///
/// `start` is the 0-based index of the first row sent; row record numbers
/// (emitted when any column is updatable) are 1-based absolute indices.
fn result_page(
    command_id: &str,
    statement_id: &str,
    columns: &[MockColumn],
    rows: &[Vec<MockValue>],
    start: usize,
    sent: usize,
) -> Vec<u8> {
    let types = columns
        .iter()
        .map(|c| c.wire_type.tag())
        .collect::<Vec<_>>()
        .join(" ");
    let aliases = columns
        .iter()
        .map(|c| format!("[{}]", c.name))
        .collect::<Vec<_>>()
        .join(" ");
    let updateability = columns
        .iter()
        .map(|c| if c.updatable { "Y" } else { "N" })
        .collect::<Vec<_>>()
        .join(" ");

    let header = format!(
        "{command_id} OK\r\nResultType:Result-Set\r\nStatementID:{statement_id}\r\n\
         CommandCount:1\r\nRowCount:{}\r\nRowCount-Sent:{sent}\r\nColumn-Count:{}\r\n\
         Column-Types:{types}\r\nColumn-Aliases:{aliases}\r\n\
         Column-Updateability:{updateability}\r\n\r\n",
        rows.len(),
        columns.len(),
    );

    let with_record_number = columns.iter().any(|c| c.updatable);
    let mut out = BytesMut::from(header.as_bytes());
    for (offset, row) in rows[start..start + sent].iter().enumerate() {
        if with_record_number {
            MockValue::Long((start + offset + 1) as i32).encode(&mut out);
        }
        for value in row {
            value.encode(&mut out);
        }
    }
    out.to_vec()
}
