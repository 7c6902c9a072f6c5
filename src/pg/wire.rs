//! Protocol v3 transport over TCP.
//!
//! `PgWire` owns the socket and speaks the message exchanges behind each
//! [`WireTransport`] call:
//! - startup and authentication (cleartext, MD5, SCRAM-SHA-256)
//! - Parse / Describe / Bind+Execute / Close, each ended by Sync
//! - simple Query for ad-hoc statements
//!
//! Every exchange reads through to ReadyForQuery, so the link is always
//! idle between calls. A server error becomes a failing [`RawResult`]; only
//! I/O and framing problems are returned as `Err`.

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter, ReadHalf, WriteHalf};
use tokio::net::TcpStream;

use super::config::PgConfig;
use super::error::{PgError, PgResult, ServerError};
use super::protocol::*;
use super::scram::{self, ScramClient};
use super::transport::{RawResult, ResponseStatus, WireTransport};
use super::types::Format;

const READ_CHUNK: usize = 8192;

/// A protocol v3 link to one server session.
pub struct PgWire {
    reader: BufReader<ReadHalf<TcpStream>>,
    writer: BufWriter<WriteHalf<TcpStream>>,
    config: PgConfig,
    /// Backend process ID
    backend_pid: i32,
    /// Backend secret key (for cancellation)
    backend_secret_key: i32,
    /// Server parameters (e.g., server_version, client_encoding)
    parameters: HashMap<String, String>,
    transaction_status: TransactionStatus,
    read_buffer: BytesMut,
}

impl std::fmt::Debug for PgWire {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgWire")
            .field("address", &self.config.address())
            .field("backend_pid", &self.backend_pid)
            .field("transaction_status", &self.transaction_status)
            .finish_non_exhaustive()
    }
}

impl PgWire {
    /// Open a TCP connection and run the startup handshake.
    pub async fn connect(config: PgConfig) -> PgResult<Self> {
        let (reader, writer) = open_stream(&config).await?;
        let mut wire = Self {
            reader,
            writer,
            config,
            backend_pid: 0,
            backend_secret_key: 0,
            parameters: HashMap::new(),
            transaction_status: TransactionStatus::Idle,
            read_buffer: BytesMut::with_capacity(32768),
        };
        wire.startup().await?;
        Ok(wire)
    }

    pub fn backend_pid(&self) -> i32 {
        self.backend_pid
    }

    pub fn backend_secret_key(&self) -> i32 {
        self.backend_secret_key
    }

    /// A server parameter reported during startup, e.g. `server_version`.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    pub fn config(&self) -> &PgConfig {
        &self.config
    }

    async fn startup(&mut self) -> PgResult<()> {
        let mut options = vec![
            ("client_encoding".to_string(), "UTF8".to_string()),
            ("DateStyle".to_string(), "ISO".to_string()),
            ("IntervalStyle".to_string(), "postgres".to_string()),
        ];
        if let Some(name) = &self.config.application_name {
            options.push(("application_name".to_string(), name.clone()));
        }
        let startup = StartupMessage {
            user: self.config.user.clone(),
            database: Some(self.config.database.clone()),
            options,
        };
        self.send(&[&startup]).await?;

        loop {
            match self.receive_message().await? {
                BackendMessage::AuthenticationOk => {}
                BackendMessage::AuthenticationCleartextPassword => {
                    let password = self.password()?.to_string();
                    self.send(&[&PasswordMessage { password }]).await?;
                }
                BackendMessage::AuthenticationMD5Password { salt } => {
                    let hash = md5_password(&self.config.user, self.password()?, &salt);
                    self.send(&[&PasswordMessage { password: hash }]).await?;
                }
                BackendMessage::AuthenticationSASL { mechanisms } => {
                    if !mechanisms.iter().any(|m| m == scram::MECHANISM) {
                        return Err(PgError::Auth(format!(
                            "server requires unsupported SASL mechanisms: {:?}",
                            mechanisms
                        )));
                    }
                    self.authenticate_scram().await?;
                }
                BackendMessage::ParameterStatus { name, value } => {
                    self.parameters.insert(name, value);
                }
                BackendMessage::BackendKeyData {
                    process_id,
                    secret_key,
                } => {
                    self.backend_pid = process_id;
                    self.backend_secret_key = secret_key;
                }
                BackendMessage::ReadyForQuery { status } => {
                    self.transaction_status = status;
                    tracing::debug!(
                        pid = self.backend_pid,
                        server_version = self.parameter("server_version").unwrap_or("?"),
                        "session established"
                    );
                    return Ok(());
                }
                BackendMessage::ErrorResponse { fields } => {
                    let error = ServerError::from_fields(&fields);
                    return Err(PgError::Auth(error.to_string()));
                }
                BackendMessage::NoticeResponse { fields } => log_notice(&fields),
                other => {
                    return Err(PgError::Protocol(format!(
                        "unexpected message during startup: {:?}",
                        other
                    )))
                }
            }
        }
    }

    async fn authenticate_scram(&mut self) -> PgResult<()> {
        let mut scram = ScramClient::new(&self.config.user, self.password()?);
        let initial = SaslInitialResponseMessage {
            mechanism: scram::MECHANISM.to_string(),
            data: scram.client_first_message(),
        };
        self.send(&[&initial]).await?;

        loop {
            match self.receive_message().await? {
                BackendMessage::AuthenticationSASLContinue { data } => {
                    let data = scram.process_server_first(&data)?;
                    self.send(&[&SaslResponseMessage { data }]).await?;
                }
                BackendMessage::AuthenticationSASLFinal { data } => {
                    return scram.verify_server_final(&data);
                }
                BackendMessage::ErrorResponse { fields } => {
                    return Err(PgError::Auth(ServerError::from_fields(&fields).to_string()));
                }
                other => {
                    return Err(PgError::Protocol(format!(
                        "unexpected message during SASL exchange: {:?}",
                        other
                    )))
                }
            }
        }
    }

    fn password(&self) -> PgResult<&str> {
        self.config
            .password
            .as_deref()
            .ok_or_else(|| PgError::Auth("password required".to_string()))
    }

    // ========================================================================
    // Exchanges
    // ========================================================================

    /// Write a batch of messages and flush once.
    async fn send(&mut self, messages: &[&dyn FrontendMessage]) -> PgResult<()> {
        for msg in messages {
            tracing::trace!(message = ?msg, "send");
            self.writer.write_all(&msg.encode()?).await?;
        }
        self.writer.flush().await?;
        Ok(())
    }

    /// Receive a backend message.
    async fn receive_message(&mut self) -> PgResult<BackendMessage> {
        loop {
            if let Some(total) = BackendMessage::frame_len(&self.read_buffer)? {
                if self.read_buffer.len() >= total {
                    let mut frame: Bytes = self.read_buffer.split_to(total).freeze();
                    let msg = BackendMessage::decode(&mut frame)?;
                    tracing::trace!(message = ?msg, "receive");
                    return Ok(msg);
                }
                self.read_buffer.reserve(total - self.read_buffer.len());
            }

            let mut chunk = [0u8; READ_CHUNK];
            let n = self.reader.read(&mut chunk).await?;
            if n == 0 {
                return Err(PgError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "server closed the connection",
                )));
            }
            self.read_buffer.extend_from_slice(&chunk[..n]);
        }
    }

    /// Read one response through ReadyForQuery.
    ///
    /// With several statements in a simple query, each CommandComplete or
    /// EmptyQueryResponse starts a new result and only the last is kept.
    /// After an ErrorResponse the server skips the rest of the batch.
    async fn collect_until_ready(&mut self) -> PgResult<RawResult> {
        let mut result = RawResult::new(ResponseStatus::CommandOk);
        let mut finished = false;

        loop {
            match self.receive_message().await? {
                BackendMessage::ReadyForQuery { status } => {
                    self.transaction_status = status;
                    result.transaction_status = Some(status);
                    return Ok(result);
                }
                _ if result.status == ResponseStatus::FatalError => {}
                BackendMessage::ErrorResponse { fields } => {
                    let error = ServerError::from_fields(&fields);
                    tracing::debug!(code = %error.code, message = %error.message, "server error");
                    result = RawResult::failed(error);
                }
                BackendMessage::ParseComplete
                | BackendMessage::BindComplete
                | BackendMessage::CloseComplete
                | BackendMessage::NoData => {}
                BackendMessage::ParameterDescription { type_oids } => {
                    result.param_types = type_oids;
                }
                BackendMessage::RowDescription { fields } => {
                    if finished {
                        result = RawResult::new(ResponseStatus::CommandOk);
                        finished = false;
                    }
                    result = result.with_fields(fields);
                }
                BackendMessage::DataRow { values } => {
                    result.rows.push(values);
                }
                BackendMessage::CommandComplete { tag } => {
                    if finished {
                        result = RawResult::new(ResponseStatus::CommandOk);
                    }
                    result.command_tag = Some(tag);
                    finished = true;
                }
                BackendMessage::EmptyQueryResponse => {
                    result = RawResult::new(ResponseStatus::EmptyQuery);
                    finished = true;
                }
                BackendMessage::PortalSuspended => {
                    return Err(PgError::Protocol(
                        "portal suspended although no row limit was set".to_string(),
                    ))
                }
                BackendMessage::NoticeResponse { fields } => log_notice(&fields),
                BackendMessage::ParameterStatus { name, value } => {
                    self.parameters.insert(name, value);
                }
                BackendMessage::NotificationResponse { channel, .. } => {
                    tracing::debug!(%channel, "dropping asynchronous notification");
                }
                other => {
                    return Err(PgError::Protocol(format!(
                        "unexpected message in response: {:?}",
                        other
                    )))
                }
            }
        }
    }
}

impl WireTransport for PgWire {
    async fn prepare(&mut self, name: &str, query: &str) -> PgResult<RawResult> {
        let parse = ParseMessage {
            name: name.to_string(),
            query: query.to_string(),
            param_types: Vec::new(),
        };
        self.send(&[&parse, &SyncMessage]).await?;
        self.collect_until_ready().await
    }

    async fn describe_prepared(&mut self, name: &str) -> PgResult<RawResult> {
        let describe = DescribeMessage {
            target: Target::Statement,
            name: name.to_string(),
        };
        self.send(&[&describe, &SyncMessage]).await?;
        self.collect_until_ready().await
    }

    async fn execute_prepared(
        &mut self,
        name: &str,
        params: &[Option<String>],
        result_format: Format,
    ) -> PgResult<RawResult> {
        let bind = BindMessage {
            portal: String::new(),
            statement: name.to_string(),
            param_formats: Vec::new(),
            params: params
                .iter()
                .map(|p| p.as_ref().map(|s| Bytes::copy_from_slice(s.as_bytes())))
                .collect(),
            result_formats: vec![result_format],
        };
        let describe = DescribeMessage {
            target: Target::Portal,
            name: String::new(),
        };
        let execute = ExecuteMessage {
            portal: String::new(),
            max_rows: 0,
        };
        self.send(&[&bind, &describe, &execute, &SyncMessage]).await?;
        self.collect_until_ready().await
    }

    async fn exec(&mut self, query: &str) -> PgResult<RawResult> {
        let msg = QueryMessage {
            query: query.to_string(),
        };
        self.send(&[&msg]).await?;
        self.collect_until_ready().await
    }

    async fn deallocate(&mut self, name: &str) -> PgResult<RawResult> {
        let close = CloseMessage {
            target: Target::Statement,
            name: name.to_string(),
        };
        self.send(&[&close, &SyncMessage]).await?;
        self.collect_until_ready().await
    }

    async fn reset(&mut self) -> PgResult<()> {
        // best effort; the old socket is dropped either way
        let _ = self.send(&[&TerminateMessage]).await;
        let (reader, writer) = open_stream(&self.config).await?;
        self.reader = reader;
        self.writer = writer;
        self.read_buffer.clear();
        self.parameters.clear();
        self.transaction_status = TransactionStatus::Idle;
        self.startup().await
    }

    async fn terminate(&mut self) -> PgResult<()> {
        self.send(&[&TerminateMessage]).await?;
        self.writer.shutdown().await?;
        Ok(())
    }
}

// ============================================================================
// Helper functions
// ============================================================================

type Halves = (
    BufReader<ReadHalf<TcpStream>>,
    BufWriter<WriteHalf<TcpStream>>,
);

async fn open_stream(config: &PgConfig) -> PgResult<Halves> {
    let addr = config.address();
    tracing::debug!(%addr, user = %config.user, database = %config.database, "connecting");
    let stream = TcpStream::connect(&addr).await?;
    stream.set_nodelay(true)?;
    let (read_half, write_half) = tokio::io::split(stream);
    Ok((BufReader::new(read_half), BufWriter::new(write_half)))
}

fn log_notice(fields: &HashMap<u8, String>) {
    let notice = ServerError::from_fields(fields);
    tracing::info!(severity = %notice.severity, code = %notice.code, "{}", notice.message);
}

/// Compute MD5 password hash: `"md5" + md5(md5(password + user) + salt)`.
fn md5_password(user: &str, password: &str, salt: &[u8; 4]) -> String {
    let inner = md5::compute(format!("{}{}", password, user));
    let mut outer_input = format!("{:x}", inner).into_bytes();
    outer_input.extend_from_slice(salt);
    format!("md5{:x}", md5::compute(&outer_input))
}
