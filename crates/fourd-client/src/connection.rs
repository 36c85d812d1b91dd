//! Connection lifecycle controller.
//!
//! One [`Connection`] owns one transport, its framing codec, and the table
//! of in-flight commands. All receive processing is strictly sequential:
//! one decode pass at a time against the connection's buffer, with
//! fetch-more continuations issued synchronously from the dispatch path.
//!
//! Header units are correlated by the command id they embed. Row-data
//! units carry no id and belong to the command the last header was
//! dispatched for; the server never interleaves row data from two
//! in-flight commands, and callers must not pipeline two commands that are
//! both mid-row-stream.

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;

use fourd_codec::{CodecError, Unit, UnitCodec};
use fourd_protocol::header::{ResponseHeader, ResultKind};
use fourd_protocol::row::RowSchema;
use fourd_protocol::{CommandId, ProtocolError, Request, ServerError, Verb};

use crate::command::{Command, CommandState, CommandTable, Completion};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::result::ResultSet;
use crate::statement::{self, Params};

/// One session with a 4D SQL server.
///
/// Generic over the transport so tests can drive it over an in-memory
/// duplex pipe; production connections use [`Connection::connect`].
pub struct Connection<T = TcpStream>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    framed: Framed<T, UnitCodec>,
    config: Config,
    connected: bool,
    next_command_id: u32,
    pending: CommandTable,
    /// Id of the last command a header was dispatched for; row-data units
    /// carry no id and are attributed to this command.
    last_dispatched: Option<CommandId>,
}

impl Connection<TcpStream> {
    /// Connect to the server and log in.
    pub async fn connect(config: Config) -> Result<Self> {
        let stream = timeout(
            config.timeouts.connect_timeout,
            TcpStream::connect((config.host.clone(), config.port)),
        )
        .await
        .map_err(|_| Error::ConnectTimeout)?
        .map_err(|e| Error::Connection(e.to_string()))?;
        stream.set_nodelay(true)?;

        tracing::debug!(host = %config.host, port = config.port, "transport connected");
        Self::establish(stream, config).await
    }
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Log in over an already-established transport.
    pub async fn establish(transport: T, config: Config) -> Result<Self> {
        let mut conn = Self {
            framed: Framed::new(transport, UnitCodec::new()),
            config,
            connected: false,
            next_command_id: 1,
            pending: CommandTable::default(),
            last_dispatched: None,
        };

        let id = conn.allocate_id();
        let request = Request::login(
            id,
            &conn.config.user,
            &conn.config.password,
            &conn.config.os_name,
            &conn.config.os_version,
        );
        conn.pending.insert(Command::new(id, Verb::Login));
        conn.framed.send(request).await?;
        conn.drive(id).await?;

        conn.connected = true;
        tracing::debug!(user = %conn.config.user, "login succeeded");
        Ok(conn)
    }

    /// Whether the session is usable.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Number of commands still awaiting their response.
    #[must_use]
    pub fn pending_commands(&self) -> usize {
        self.pending.len()
    }

    /// The connection configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Execute a statement and drive it to completion, fetching further
    /// pages as needed.
    ///
    /// Fails fast with [`Error::NotConnected`] when the session is down;
    /// requests are never queued.
    pub async fn query(&mut self, sql: &str, params: &Params) -> Result<ResultSet> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        let text = statement::prepare(sql, params)?;
        let id = self.allocate_id();
        tracing::debug!(command_id = %id, statement = %text, "executing statement");

        self.pending.insert(Command::new(id, Verb::ExecuteStatement));
        self.framed
            .send(Request::execute(id, &text, self.config.fetch_limit))
            .await?;
        self.drive(id).await
    }

    /// Log out and ask the peer to close the transport.
    ///
    /// LOGOUT is acknowledged by the server; QUIT is not, the peer simply
    /// closes the connection afterwards.
    pub async fn close(mut self) -> Result<()> {
        if self.connected {
            let id = self.allocate_id();
            self.pending.insert(Command::new(id, Verb::Logout));
            self.framed.send(Request::logout(id)).await?;
            self.drive(id).await?;
            self.connected = false;
        }

        let id = self.allocate_id();
        self.framed.send(Request::quit(id)).await?;
        let _ = self.framed.get_mut().shutdown().await;
        tracing::debug!("connection closed");
        Ok(())
    }

    fn allocate_id(&mut self) -> CommandId {
        let id = CommandId::new(self.next_command_id);
        self.next_command_id += 1;
        id
    }

    /// Read and dispatch units until the chain rooted at `root` completes.
    async fn drive(&mut self, root: CommandId) -> Result<ResultSet> {
        loop {
            let unit = match self.next_unit().await {
                Ok(unit) => unit,
                Err(Error::Codec(CodecError::Protocol(protocol_error))) => {
                    // The inbound stream is undecodable from here on. The
                    // owning command gets the error as its outcome and the
                    // connection is taken out of service.
                    self.connected = false;
                    self.framed.codec_mut().clear_row_schema();
                    let error = map_stream_error(protocol_error);
                    let Some(id) = self.last_dispatched else {
                        return Err(error);
                    };
                    let completion = self.fail_command(id, error);
                    return if completion.root_id == root {
                        completion.outcome
                    } else {
                        Err(Error::ConnectionClosed)
                    };
                }
                Err(error) => return Err(error),
            };

            if let Some(completion) = self.dispatch(unit).await? {
                if completion.root_id == root {
                    return completion.outcome;
                }
                tracing::warn!(
                    root_id = %completion.root_id,
                    "completion for a chain nobody is awaiting"
                );
            }
        }
    }

    /// Receive the next complete unit, under the idle deadline.
    async fn next_unit(&mut self) -> Result<Unit> {
        match timeout(self.config.timeouts.idle_timeout, self.framed.next()).await {
            Err(_) => {
                tracing::warn!("idle timeout; marking connection disconnected");
                self.connected = false;
                Err(Error::IdleTimeout)
            }
            Ok(None) => {
                self.connected = false;
                Err(Error::ConnectionClosed)
            }
            Ok(Some(Err(error))) => {
                // Any stream error (IO, desynchronization, oversized
                // header, undecodable rows) leaves the receive buffer in
                // an unusable state; the connection is done.
                self.connected = false;
                Err(error.into())
            }
            Ok(Some(Ok(unit))) => Ok(unit),
        }
    }

    /// Route one unit to its owning command.
    ///
    /// Returns the completion of a command chain, if this unit finished
    /// one. Server-reported and decode errors become the owning command's
    /// outcome; they never escape this loop as stream failures.
    async fn dispatch(&mut self, unit: Unit) -> Result<Option<Completion>> {
        match unit {
            Unit::Header(block) => {
                let id = block.command_id;
                let Some(command) = self.pending.get_mut(id) else {
                    tracing::warn!(command_id = %id, "header for unknown command; dropped");
                    return Ok(None);
                };
                let verb = command.verb;
                self.last_dispatched = Some(id);

                let mut header = match ResponseHeader::from_block(&block) {
                    Ok(header) => header,
                    Err(error) => return Ok(Some(self.fail_command(id, error.into()))),
                };
                if let Some(server_error) = header.error.take() {
                    tracing::debug!(command_id = %id, code = server_error.code, "server error");
                    return Ok(Some(self.fail_command(id, Error::Server(server_error))));
                }

                match verb {
                    Verb::Login | Verb::Logout | Verb::Quit => Ok(Some(self.complete_ok(id))),
                    Verb::ExecuteStatement | Verb::FetchResult => match header.kind {
                        ResultKind::UpdateCount => {
                            if let Some(command) = self.pending.get_mut(id) {
                                command.result = Some(ResultSet::from_header(&header));
                            }
                            Ok(Some(self.complete_ok(id)))
                        }
                        ResultKind::ResultSet => {
                            let schema = RowSchema::from_header(&header);
                            if let Some(command) = self.pending.get_mut(id) {
                                match command.result.as_mut() {
                                    Some(result) => result.apply_page_header(&header),
                                    None => command.result = Some(ResultSet::from_header(&header)),
                                }
                                command.state = CommandState::PartiallyReceived;
                            }
                            self.framed.codec_mut().set_row_schema(schema);
                            self.advance_result(id).await
                        }
                        ResultKind::Error => Ok(Some(self.fail_command(
                            id,
                            Error::UnexpectedResponse(
                                "header carries no usable result type".to_string(),
                            ),
                        ))),
                    },
                }
            }
            Unit::Rows(batch) => {
                let Some(id) = self.last_dispatched else {
                    tracing::warn!("row data with no dispatched command; dropped");
                    return Ok(None);
                };
                let Some(schema) = self.framed.codec().row_schema() else {
                    return Err(ProtocolError::UnexpectedRowData.into());
                };
                let Some(command) = self.pending.get_mut(id) else {
                    tracing::warn!(command_id = %id, "row data for unknown command; dropped");
                    return Ok(None);
                };
                let Some(result) = command.result.as_mut() else {
                    tracing::warn!(command_id = %id, "row data before result set; dropped");
                    return Ok(None);
                };

                tracing::trace!(command_id = %id, rows = batch.rows.len(), "merging row batch");
                result.merge_batch(batch, schema);
                self.advance_result(id).await
            }
        }
    }

    /// Apply the pagination rule after a page header or row merge: finish
    /// the chain when the declared total is reached, or issue the next
    /// FETCH-RESULT when the current page is exhausted short of it.
    async fn advance_result(&mut self, id: CommandId) -> Result<Option<Completion>> {
        let Some(command) = self.pending.get_mut(id) else {
            return Ok(None);
        };
        let Some(result) = command.result.as_ref() else {
            return Ok(None);
        };

        if result.is_complete() {
            self.framed.codec_mut().clear_row_schema();
            self.last_dispatched = None;
            return Ok(Some(self.complete_ok(id)));
        }
        if !result.needs_fetch() {
            return Ok(None);
        }

        let Some(statement_id) = result.statement_id.clone() else {
            return Ok(Some(self.fail_command(
                id,
                Error::UnexpectedResponse(
                    "page exhausted but no statement id to fetch more".to_string(),
                ),
            )));
        };
        let first_row = result.rows.len() as u64 + 1;
        let last_row = result.rows.len() as u64 + u64::from(self.config.fetch_limit);

        let new_id = self.allocate_id();
        let Some(finished) = self.pending.complete(id) else {
            return Ok(None);
        };
        tracing::debug!(
            command_id = %new_id,
            statement_id = %statement_id,
            first_row,
            last_row,
            "fetching next page"
        );
        self.pending.insert(Command::continuation(
            new_id,
            finished.root_id,
            finished.result.unwrap_or_default(),
        ));
        self.framed
            .send(Request::fetch(new_id, &statement_id, 0, first_row, last_row))
            .await?;
        Ok(None)
    }

    /// Complete a command successfully, removing it from the table.
    fn complete_ok(&mut self, id: CommandId) -> Completion {
        match self.pending.complete(id) {
            Some(command) => Completion {
                root_id: command.root_id,
                outcome: Ok(command.result.unwrap_or_default()),
            },
            None => Completion {
                root_id: id,
                outcome: Ok(ResultSet::default()),
            },
        }
    }

    /// Complete a command with an error, removing it from the table.
    fn fail_command(&mut self, id: CommandId, error: Error) -> Completion {
        match self.pending.complete(id) {
            Some(command) => Completion {
                root_id: command.root_id,
                outcome: Err(error),
            },
            None => Completion {
                root_id: id,
                outcome: Err(error),
            },
        }
    }
}

impl<T> std::fmt::Debug for Connection<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("connected", &self.connected)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

/// Map an undecodable-stream error to the owning command's outcome.
fn map_stream_error(error: ProtocolError) -> Error {
    match error {
        ProtocolError::RowServerError { code } => Error::Server(ServerError {
            code,
            message: "error reported in row data".to_string(),
        }),
        other => Error::Protocol(other),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use bytes::BufMut;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    /// Read one request block (terminated by a blank line) from the
    /// scripted server side.
    async fn read_block(io: &mut DuplexStream, buf: &mut Vec<u8>) -> String {
        loop {
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let block: Vec<u8> = buf.drain(..pos + 4).collect();
                return String::from_utf8(block).unwrap();
            }
            let mut chunk = [0u8; 256];
            let n = io.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client hung up mid-script");
            buf.extend_from_slice(&chunk[..n]);
        }
    }

    fn request_id(block: &str) -> &str {
        &block[..10]
    }

    fn test_config() -> Config {
        Config::new().with_timeouts(crate::config::TimeoutConfig {
            connect_timeout: Duration::from_secs(1),
            idle_timeout: Duration::from_secs(1),
        })
    }

    #[tokio::test]
    async fn test_login_ok() {
        let (client, mut server) = tokio::io::duplex(4096);
        let script = tokio::spawn(async move {
            let mut buf = Vec::new();
            let login = read_block(&mut server, &mut buf).await;
            assert!(login.starts_with("0000000001 LOGIN\r\n"));
            assert!(login.contains("USER-NAME:Administrator\r\n"));
            server.write_all(b"0000000001 OK\r\n\r\n").await.unwrap();
            server
        });

        let conn = Connection::establish(client, test_config()).await.unwrap();
        assert!(conn.is_connected());
        assert_eq!(conn.pending_commands(), 0);
        script.await.unwrap();
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let (client, mut server) = tokio::io::duplex(4096);
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let login = read_block(&mut server, &mut buf).await;
            let response = format!(
                "{} ERROR\r\nError-Code:1004\r\nError-Description:invalid credentials\r\n\r\n",
                request_id(&login)
            );
            server.write_all(response.as_bytes()).await.unwrap();
            // Keep the transport open until the client has decoded.
            let mut rest = Vec::new();
            let _ = server.read_to_end(&mut rest).await;
        });

        let err = Connection::establish(client, test_config())
            .await
            .unwrap_err();
        assert_eq!(err.server_code(), Some(1004));
    }

    #[tokio::test]
    async fn test_query_single_page() {
        let (client, mut server) = tokio::io::duplex(4096);
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let login = read_block(&mut server, &mut buf).await;
            server
                .write_all(format!("{} OK\r\n\r\n", request_id(&login)).as_bytes())
                .await
                .unwrap();

            let execute = read_block(&mut server, &mut buf).await;
            assert!(execute.contains("EXECUTE-STATEMENT"));
            assert!(execute.contains("STATEMENT:SELECT * FROM T WHERE name = 'x'\r\n"));
            let header = format!(
                "{} OK\r\nResultType:Result-Set\r\nStatementID:5\r\nCommandCount:2\r\n\
                 RowCount:2\r\nRowCount-Sent:2\r\nColumn-Types:VK_LONG VK_STRING\r\n\
                 Column-Aliases:[id] [name]\r\nColumn-Updateability:N N\r\n\r\n",
                request_id(&execute)
            );
            server.write_all(header.as_bytes()).await.unwrap();

            let mut rows = Vec::new();
            for (id, name) in [(1i32, "aa"), (2, "bb")] {
                rows.put_u8(1);
                rows.put_i32_le(id);
                rows.put_u8(1);
                let units: Vec<u16> = name.encode_utf16().collect();
                rows.put_i32_le(units.len() as i32);
                for u in units {
                    rows.put_u16_le(u);
                }
            }
            // Deliver the row run split in two to exercise reassembly.
            let half = rows.len() / 2;
            server.write_all(&rows[..half]).await.unwrap();
            tokio::task::yield_now().await;
            server.write_all(&rows[half..]).await.unwrap();

            let logout = read_block(&mut server, &mut buf).await;
            assert!(logout.contains("LOGOUT"));
            server
                .write_all(format!("{} OK\r\n\r\n", request_id(&logout)).as_bytes())
                .await
                .unwrap();
            let quit = read_block(&mut server, &mut buf).await;
            assert!(quit.contains("QUIT"));
        });

        let mut conn = Connection::establish(client, test_config()).await.unwrap();
        let result = conn
            .query(
                "SELECT * FROM T WHERE name = $0",
                &Params::positional(["x"]),
            )
            .await
            .unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result.rows[0].get_i64("id"), Some(1));
        assert_eq!(result.rows[0].get_str("name"), Some("aa"));
        assert_eq!(result.rows[1].get_i64("id"), Some(2));
        assert_eq!(result.fields.len(), 2);
        assert_eq!(conn.pending_commands(), 0);

        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_command_ids_strictly_increase() {
        let (client, mut server) = tokio::io::duplex(4096);
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let mut expected = 1u32;
            loop {
                let block = read_block(&mut server, &mut buf).await;
                assert_eq!(request_id(&block), format!("{expected:010}"));
                expected += 1;
                if block.contains("QUIT") {
                    break;
                }
                let response = if block.contains("EXECUTE-STATEMENT") {
                    format!(
                        "{} OK\r\nResultType:Update-Count\r\n\r\n",
                        request_id(&block)
                    )
                } else {
                    format!("{} OK\r\n\r\n", request_id(&block))
                };
                server.write_all(response.as_bytes()).await.unwrap();
            }
        });

        let mut conn = Connection::establish(client, test_config()).await.unwrap();
        for _ in 0..3 {
            conn.query("DELETE FROM T", &Params::None).await.unwrap();
        }
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_update_count_completes_without_rows() {
        let (client, mut server) = tokio::io::duplex(4096);
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let login = read_block(&mut server, &mut buf).await;
            server
                .write_all(format!("{} OK\r\n\r\n", request_id(&login)).as_bytes())
                .await
                .unwrap();
            let execute = read_block(&mut server, &mut buf).await;
            let response = format!(
                "{} OK\r\nResultType:Update-Count\r\nUpdate-Count:3\r\n\r\n",
                request_id(&execute)
            );
            server.write_all(response.as_bytes()).await.unwrap();
            let mut rest = Vec::new();
            let _ = server.read_to_end(&mut rest).await;
        });

        let mut conn = Connection::establish(client, test_config()).await.unwrap();
        let result = conn.query("DELETE FROM T", &Params::None).await.unwrap();
        assert_eq!(result.kind, ResultKind::UpdateCount);
        assert!(result.fields.is_empty());
        assert_eq!(result.affected_rows, Some(3));
        assert_eq!(conn.pending_commands(), 0);
    }

    #[tokio::test]
    async fn test_desynchronized_stream_disconnects() {
        let (client, mut server) = tokio::io::duplex(4096);
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let login = read_block(&mut server, &mut buf).await;
            server
                .write_all(format!("{} OK\r\n\r\n", request_id(&login)).as_bytes())
                .await
                .unwrap();
            let _execute = read_block(&mut server, &mut buf).await;
            server.write_all(b"garbage response").await.unwrap();
            let mut rest = Vec::new();
            let _ = server.read_to_end(&mut rest).await;
        });

        let mut conn = Connection::establish(client, test_config()).await.unwrap();
        let err = conn.query("SELECT 1", &Params::None).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Codec(CodecError::Desynchronized { first: b'g' })
        ));
        assert!(!conn.is_connected());

        let err = conn.query("SELECT 1", &Params::None).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }

    #[tokio::test]
    async fn test_query_while_disconnected_fails_fast() {
        let (client, mut server) = tokio::io::duplex(4096);
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let login = read_block(&mut server, &mut buf).await;
            server
                .write_all(format!("{} OK\r\n\r\n", request_id(&login)).as_bytes())
                .await
                .unwrap();
            // Swallow the query and never answer it.
            let _ = read_block(&mut server, &mut buf).await;
            std::mem::forget(server);
        });

        let config = Config::new().with_timeouts(crate::config::TimeoutConfig {
            connect_timeout: Duration::from_secs(1),
            idle_timeout: Duration::from_millis(50),
        });
        let mut conn = Connection::establish(client, config).await.unwrap();

        let err = conn.query("SELECT 1", &Params::None).await.unwrap_err();
        assert!(matches!(err, Error::IdleTimeout));
        assert!(!conn.is_connected());

        // Fails synchronously, never queued.
        let err = conn.query("SELECT 1", &Params::None).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }
}
