//! PostgreSQL wire protocol message encoding and decoding.
//!
//! This module implements the PostgreSQL v3 protocol messages the driver
//! sends and understands.
//! Reference: https://www.postgresql.org/docs/current/protocol-message-formats.html

use std::collections::HashMap;
use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::error::{PgError, PgResult};
use super::types::{Format, Oid};

// ============================================================================
// Protocol Constants
// ============================================================================

/// PostgreSQL protocol version 3.0
pub const PROTOCOL_VERSION: i32 = 196608; // (3 << 16) | 0

/// Largest backend message accepted (1 GiB, the server's own field limit).
pub const MAX_MESSAGE_LEN: usize = 1 << 30;

/// Transaction status indicators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionStatus {
    /// Idle (not in a transaction block)
    #[default]
    Idle,
    /// In a transaction block
    InTransaction,
    /// In a failed transaction block
    Failed,
}

impl TransactionStatus {
    pub fn as_byte(self) -> u8 {
        match self {
            TransactionStatus::Idle => b'I',
            TransactionStatus::InTransaction => b'T',
            TransactionStatus::Failed => b'E',
        }
    }
}

impl TryFrom<u8> for TransactionStatus {
    type Error = PgError;

    fn try_from(b: u8) -> PgResult<Self> {
        match b {
            b'I' => Ok(TransactionStatus::Idle),
            b'T' => Ok(TransactionStatus::InTransaction),
            b'E' => Ok(TransactionStatus::Failed),
            other => Err(PgError::Protocol(format!(
                "unknown transaction status {:?}",
                other as char
            ))),
        }
    }
}

/// What a Describe or Close message refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Statement,
    Portal,
}

impl Target {
    fn code(self) -> u8 {
        match self {
            Target::Statement => b'S',
            Target::Portal => b'P',
        }
    }
}

// ============================================================================
// Frontend (Client -> Server) Messages
// ============================================================================

/// Trait for encoding frontend messages
pub trait FrontendMessage: fmt::Debug + Sync {
    fn encode(&self) -> PgResult<BytesMut>;
}

/// Frame a tagged message: tag byte, then the body prefixed by its length
/// (which counts the length field itself).
fn tagged(tag: u8, write_body: impl FnOnce(&mut BytesMut)) -> BytesMut {
    let mut buf = BytesMut::with_capacity(64);
    buf.put_u8(tag);
    buf.put_i32(0);
    write_body(&mut buf);
    let len = (buf.len() - 1) as i32;
    buf[1..5].copy_from_slice(&len.to_be_bytes());
    buf
}

/// Count fields are Int16 on the wire, read by the server as unsigned.
fn wire_count(what: &str, n: usize) -> PgResult<u16> {
    u16::try_from(n).map_err(|_| {
        PgError::InvalidArgument(format!("{} {} exceeds the protocol limit of {}", n, what, u16::MAX))
    })
}

fn value_len(n: usize) -> PgResult<i32> {
    i32::try_from(n)
        .map_err(|_| PgError::InvalidArgument(format!("value of {} bytes is too large to send", n)))
}

fn put_cstring(buf: &mut BytesMut, s: &str) {
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
}

/// Startup message sent at connection start (untagged)
#[derive(Debug, Clone)]
pub struct StartupMessage {
    pub user: String,
    pub database: Option<String>,
    pub options: Vec<(String, String)>,
}

impl FrontendMessage for StartupMessage {
    fn encode(&self) -> PgResult<BytesMut> {
        let mut buf = BytesMut::new();

        // Placeholder for length (will be filled in at the end)
        buf.put_i32(0);
        buf.put_i32(PROTOCOL_VERSION);

        buf.put_slice(b"user\0");
        put_cstring(&mut buf, &self.user);

        if let Some(ref db) = self.database {
            buf.put_slice(b"database\0");
            put_cstring(&mut buf, db);
        }

        for (key, value) in &self.options {
            put_cstring(&mut buf, key);
            put_cstring(&mut buf, value);
        }

        // Terminator
        buf.put_u8(0);

        let len = buf.len() as i32;
        buf[0..4].copy_from_slice(&len.to_be_bytes());
        Ok(buf)
    }
}

/// Password message (for MD5 or plaintext auth)
#[derive(Clone)]
pub struct PasswordMessage {
    pub password: String,
}

impl fmt::Debug for PasswordMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordMessage").finish_non_exhaustive()
    }
}

impl FrontendMessage for PasswordMessage {
    fn encode(&self) -> PgResult<BytesMut> {
        Ok(tagged(b'p', |buf| put_cstring(buf, &self.password)))
    }
}

/// Simple query message ('Q')
#[derive(Debug, Clone)]
pub struct QueryMessage {
    pub query: String,
}

impl FrontendMessage for QueryMessage {
    fn encode(&self) -> PgResult<BytesMut> {
        Ok(tagged(b'Q', |buf| put_cstring(buf, &self.query)))
    }
}

/// Parse message ('P') - Creates a prepared statement
#[derive(Debug, Clone)]
pub struct ParseMessage {
    pub name: String,
    pub query: String,
    /// Empty lets the server infer every parameter type.
    pub param_types: Vec<Oid>,
}

impl FrontendMessage for ParseMessage {
    fn encode(&self) -> PgResult<BytesMut> {
        let num_types = wire_count("parameter types", self.param_types.len())?;
        Ok(tagged(b'P', |buf| {
            put_cstring(buf, &self.name);
            put_cstring(buf, &self.query);
            buf.put_u16(num_types);
            for oid in &self.param_types {
                buf.put_u32(oid.as_u32());
            }
        }))
    }
}

/// Bind message ('B') - Binds parameters to a prepared statement
#[derive(Debug, Clone)]
pub struct BindMessage {
    pub portal: String,
    pub statement: String,
    /// Zero codes means all text, one code applies to every parameter.
    pub param_formats: Vec<Format>,
    /// Already-encoded parameter payloads; `None` is NULL.
    pub params: Vec<Option<Bytes>>,
    pub result_formats: Vec<Format>,
}

impl FrontendMessage for BindMessage {
    fn encode(&self) -> PgResult<BytesMut> {
        let num_formats = wire_count("parameter format codes", self.param_formats.len())?;
        let num_params = wire_count("parameters", self.params.len())?;
        let num_results = wire_count("result format codes", self.result_formats.len())?;
        let lengths = self
            .params
            .iter()
            .map(|p| p.as_ref().map(|data| value_len(data.len())).transpose())
            .collect::<PgResult<Vec<_>>>()?;

        Ok(tagged(b'B', |buf| {
            put_cstring(buf, &self.portal);
            put_cstring(buf, &self.statement);

            buf.put_u16(num_formats);
            for fmt in &self.param_formats {
                buf.put_i16(fmt.code());
            }

            buf.put_u16(num_params);
            for (param, len) in self.params.iter().zip(&lengths) {
                match (param, len) {
                    (Some(data), Some(len)) => {
                        buf.put_i32(*len);
                        buf.put_slice(data);
                    }
                    _ => buf.put_i32(-1),
                }
            }

            buf.put_u16(num_results);
            for fmt in &self.result_formats {
                buf.put_i16(fmt.code());
            }
        }))
    }
}

/// Execute message ('E') - Executes a bound portal
#[derive(Debug, Clone)]
pub struct ExecuteMessage {
    pub portal: String,
    /// 0 = no limit
    pub max_rows: i32,
}

impl FrontendMessage for ExecuteMessage {
    fn encode(&self) -> PgResult<BytesMut> {
        Ok(tagged(b'E', |buf| {
            put_cstring(buf, &self.portal);
            buf.put_i32(self.max_rows);
        }))
    }
}

/// Describe message ('D') - Request description of statement or portal
#[derive(Debug, Clone)]
pub struct DescribeMessage {
    pub target: Target,
    pub name: String,
}

impl FrontendMessage for DescribeMessage {
    fn encode(&self) -> PgResult<BytesMut> {
        Ok(tagged(b'D', |buf| {
            buf.put_u8(self.target.code());
            put_cstring(buf, &self.name);
        }))
    }
}

/// Close message ('C') - Releases a prepared statement or portal
#[derive(Debug, Clone)]
pub struct CloseMessage {
    pub target: Target,
    pub name: String,
}

impl FrontendMessage for CloseMessage {
    fn encode(&self) -> PgResult<BytesMut> {
        Ok(tagged(b'C', |buf| {
            buf.put_u8(self.target.code());
            put_cstring(buf, &self.name);
        }))
    }
}

/// Sync message ('S') - Marks end of an extended query
#[derive(Debug, Clone, Copy)]
pub struct SyncMessage;

impl FrontendMessage for SyncMessage {
    fn encode(&self) -> PgResult<BytesMut> {
        Ok(tagged(b'S', |_| {}))
    }
}

/// Terminate message ('X') - Close the connection
#[derive(Debug, Clone, Copy)]
pub struct TerminateMessage;

impl FrontendMessage for TerminateMessage {
    fn encode(&self) -> PgResult<BytesMut> {
        Ok(tagged(b'X', |_| {}))
    }
}

/// SASL Initial Response message ('p') - First SCRAM message
#[derive(Debug, Clone)]
pub struct SaslInitialResponseMessage {
    /// SASL mechanism name (e.g., "SCRAM-SHA-256")
    pub mechanism: String,
    pub data: Vec<u8>,
}

impl FrontendMessage for SaslInitialResponseMessage {
    fn encode(&self) -> PgResult<BytesMut> {
        let len = value_len(self.data.len())?;
        Ok(tagged(b'p', |buf| {
            put_cstring(buf, &self.mechanism);
            buf.put_i32(len);
            buf.put_slice(&self.data);
        }))
    }
}

/// SASL Response message ('p') - Subsequent SCRAM messages
#[derive(Debug, Clone)]
pub struct SaslResponseMessage {
    pub data: Vec<u8>,
}

impl FrontendMessage for SaslResponseMessage {
    fn encode(&self) -> PgResult<BytesMut> {
        Ok(tagged(b'p', |buf| buf.put_slice(&self.data)))
    }
}

// ============================================================================
// Backend (Server -> Client) Messages
// ============================================================================

/// Field description in a RowDescription message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescription {
    pub name: String,
    pub table_oid: u32,
    pub column_attr: i16,
    pub type_oid: Oid,
    pub type_size: i16,
    pub type_modifier: i32,
    pub format: Format,
}

impl FieldDescription {
    /// Field of a computed column (no source table).
    pub fn new(name: impl Into<String>, type_oid: Oid, format: Format) -> Self {
        Self {
            name: name.into(),
            table_oid: 0,
            column_attr: 0,
            type_oid,
            type_size: -1,
            type_modifier: -1,
            format,
        }
    }
}

/// Backend message types
#[derive(Debug, Clone)]
pub enum BackendMessage {
    // Authentication
    AuthenticationOk,
    AuthenticationCleartextPassword,
    AuthenticationMD5Password { salt: [u8; 4] },
    AuthenticationSASL { mechanisms: Vec<String> },
    AuthenticationSASLContinue { data: Bytes },
    AuthenticationSASLFinal { data: Bytes },

    // Query responses
    RowDescription { fields: Vec<FieldDescription> },
    DataRow { values: Vec<Option<Bytes>> },
    CommandComplete { tag: String },
    EmptyQueryResponse,

    // Extended query protocol
    ParseComplete,
    BindComplete,
    CloseComplete,
    NoData,
    PortalSuspended,
    ParameterDescription { type_oids: Vec<Oid> },

    // Status
    ReadyForQuery { status: TransactionStatus },
    ParameterStatus { name: String, value: String },
    BackendKeyData { process_id: i32, secret_key: i32 },

    // Errors and notices
    ErrorResponse { fields: HashMap<u8, String> },
    NoticeResponse { fields: HashMap<u8, String> },

    NotificationResponse {
        process_id: i32,
        channel: String,
        payload: String,
    },
}

impl BackendMessage {
    /// Length of the complete message at the front of `buf` (tag included),
    /// or `None` if the header has not fully arrived.
    pub fn frame_len(buf: &[u8]) -> PgResult<Option<usize>> {
        if buf.len() < 5 {
            return Ok(None);
        }
        let len = i32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
        let len = usize::try_from(len)
            .ok()
            .filter(|len| (4..=MAX_MESSAGE_LEN).contains(len))
            .ok_or_else(|| {
                PgError::Protocol(format!(
                    "invalid length {} for message {:?}",
                    len, buf[0] as char
                ))
            })?;
        Ok(Some(len + 1))
    }

    /// Decode a backend message from bytes.
    ///
    /// The input buffer should start with the message type byte and hold
    /// at least one complete message.
    pub fn decode(buf: &mut Bytes) -> PgResult<Self> {
        let total = Self::frame_len(buf)?
            .filter(|total| *total <= buf.len())
            .ok_or_else(|| PgError::Protocol("incomplete message".to_string()))?;

        let msg_type = buf.get_u8();
        buf.advance(4);
        let body = buf.split_to(total - 5);
        let mut body = Body { msg_type, buf: body };

        let msg = match msg_type {
            b'R' => body.auth()?,
            b'T' => body.row_description()?,
            b'D' => body.data_row()?,
            b'C' => BackendMessage::CommandComplete {
                tag: body.cstring()?,
            },
            b'Z' => BackendMessage::ReadyForQuery {
                status: TransactionStatus::try_from(body.u8()?)?,
            },
            b'E' => BackendMessage::ErrorResponse {
                fields: body.error_fields()?,
            },
            b'N' => BackendMessage::NoticeResponse {
                fields: body.error_fields()?,
            },
            b'S' => BackendMessage::ParameterStatus {
                name: body.cstring()?,
                value: body.cstring()?,
            },
            b'K' => BackendMessage::BackendKeyData {
                process_id: body.i32()?,
                secret_key: body.i32()?,
            },
            b'1' => BackendMessage::ParseComplete,
            b'2' => BackendMessage::BindComplete,
            b'3' => BackendMessage::CloseComplete,
            b'I' => BackendMessage::EmptyQueryResponse,
            b'n' => BackendMessage::NoData,
            b's' => BackendMessage::PortalSuspended,
            b't' => body.parameter_description()?,
            b'A' => BackendMessage::NotificationResponse {
                process_id: body.i32()?,
                channel: body.cstring()?,
                payload: body.cstring()?,
            },
            _ => {
                return Err(PgError::Protocol(format!(
                    "unknown message type: {:?}",
                    msg_type as char
                )))
            }
        };
        Ok(msg)
    }
}

/// Bounds-checked cursor over one message body.
struct Body {
    msg_type: u8,
    buf: Bytes,
}

impl Body {
    fn need(&self, n: usize) -> PgResult<()> {
        if self.buf.remaining() < n {
            return Err(PgError::Protocol(format!(
                "message {:?} truncated: needed {} more bytes, {} left",
                self.msg_type as char,
                n,
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    fn u8(&mut self) -> PgResult<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    fn i16(&mut self) -> PgResult<i16> {
        self.need(2)?;
        Ok(self.buf.get_i16())
    }

    fn i32(&mut self) -> PgResult<i32> {
        self.need(4)?;
        Ok(self.buf.get_i32())
    }

    fn u32(&mut self) -> PgResult<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32())
    }

    fn count(&mut self) -> PgResult<usize> {
        self.need(2)?;
        Ok(usize::from(self.buf.get_u16()))
    }

    fn bytes(&mut self, n: usize) -> PgResult<Bytes> {
        self.need(n)?;
        Ok(self.buf.split_to(n))
    }

    /// Read a null-terminated string.
    fn cstring(&mut self) -> PgResult<String> {
        let end = self
            .buf
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| PgError::Protocol("missing null terminator in string".to_string()))?;
        let raw = self.buf.split_to(end);
        self.buf.advance(1);
        String::from_utf8(raw.to_vec())
            .map_err(|_| PgError::Protocol("string field is not valid UTF-8".to_string()))
    }

    fn auth(&mut self) -> PgResult<BackendMessage> {
        let auth_type = self.i32()?;
        match auth_type {
            0 => Ok(BackendMessage::AuthenticationOk),
            3 => Ok(BackendMessage::AuthenticationCleartextPassword),
            5 => {
                let mut salt = [0u8; 4];
                salt.copy_from_slice(&self.bytes(4)?);
                Ok(BackendMessage::AuthenticationMD5Password { salt })
            }
            10 => {
                let mut mechanisms = Vec::new();
                while self.buf.has_remaining() {
                    let mech = self.cstring()?;
                    if mech.is_empty() {
                        break;
                    }
                    mechanisms.push(mech);
                }
                Ok(BackendMessage::AuthenticationSASL { mechanisms })
            }
            11 => Ok(BackendMessage::AuthenticationSASLContinue {
                data: self.buf.split_off(0),
            }),
            12 => Ok(BackendMessage::AuthenticationSASLFinal {
                data: self.buf.split_off(0),
            }),
            _ => Err(PgError::Auth(format!(
                "unsupported authentication method {}",
                auth_type
            ))),
        }
    }

    fn row_description(&mut self) -> PgResult<BackendMessage> {
        let num_fields = self.count()?;
        let mut fields = Vec::with_capacity(num_fields);
        for _ in 0..num_fields {
            fields.push(FieldDescription {
                name: self.cstring()?,
                table_oid: self.u32()?,
                column_attr: self.i16()?,
                type_oid: Oid(self.u32()?),
                type_size: self.i16()?,
                type_modifier: self.i32()?,
                format: Format::from_code(self.i16()?),
            });
        }
        Ok(BackendMessage::RowDescription { fields })
    }

    fn data_row(&mut self) -> PgResult<BackendMessage> {
        let num_cols = self.count()?;
        let mut values = Vec::with_capacity(num_cols);
        for _ in 0..num_cols {
            let len = self.i32()?;
            if len < 0 {
                values.push(None);
            } else {
                values.push(Some(self.bytes(len as usize)?));
            }
        }
        Ok(BackendMessage::DataRow { values })
    }

    fn parameter_description(&mut self) -> PgResult<BackendMessage> {
        let num_params = self.count()?;
        let mut type_oids = Vec::with_capacity(num_params);
        for _ in 0..num_params {
            type_oids.push(Oid(self.u32()?));
        }
        Ok(BackendMessage::ParameterDescription { type_oids })
    }

    /// Error/notice fields: `(code byte, cstring)*` ended by a zero byte.
    fn error_fields(&mut self) -> PgResult<HashMap<u8, String>> {
        let mut fields = HashMap::new();
        while self.buf.has_remaining() {
            let field_type = self.u8()?;
            if field_type == 0 {
                break;
            }
            let value = self.cstring()?;
            fields.insert(field_type, value);
        }
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(tag: u8, body: &[u8]) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u8(tag);
        buf.put_i32(body.len() as i32 + 4);
        buf.put_slice(body);
        buf.freeze()
    }

    #[test]
    fn test_startup_message_structure() {
        let msg = StartupMessage {
            user: "test".to_string(),
            database: Some("testdb".to_string()),
            options: vec![("client_encoding".to_string(), "UTF8".to_string())],
        };

        let encoded = msg.encode().unwrap();
        let len = i32::from_be_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]);
        assert_eq!(len as usize, encoded.len());
        assert_eq!(&encoded[4..8], &PROTOCOL_VERSION.to_be_bytes());
        assert!(encoded.ends_with(b"UTF8\0\0"));
    }

    #[test]
    fn test_query_message_structure() {
        let encoded = QueryMessage {
            query: "SELECT 1".to_string(),
        }
        .encode()
        .unwrap();

        assert_eq!(encoded[0], b'Q');
        let len = i32::from_be_bytes([encoded[1], encoded[2], encoded[3], encoded[4]]);
        assert_eq!(len as usize, encoded.len() - 1);
        assert_eq!(&encoded[5..], b"SELECT 1\0");
    }

    #[test]
    fn test_bind_message_encodes_null_and_formats() {
        let encoded = BindMessage {
            portal: String::new(),
            statement: "s1".to_string(),
            param_formats: vec![],
            params: vec![Some(Bytes::from_static(b"41")), None],
            result_formats: vec![Format::Binary],
        }
        .encode()
        .unwrap();

        let body = &encoded[5..];
        // portal "" + statement "s1"
        assert_eq!(&body[..4], b"\0s1\0");
        // no param format codes, 2 params
        assert_eq!(&body[4..8], &[0, 0, 0, 2]);
        assert_eq!(&body[8..14], &[0, 0, 0, 2, b'4', b'1']);
        assert_eq!(&body[14..18], &(-1i32).to_be_bytes());
        // one result format: binary
        assert_eq!(&body[18..], &[0, 1, 0, 1]);
    }

    #[test]
    fn test_parameter_counts_are_unsigned() {
        let many = BindMessage {
            portal: String::new(),
            statement: "s1".to_string(),
            param_formats: vec![],
            params: vec![None; 40_000],
            result_formats: vec![Format::Text],
        }
        .encode()
        .unwrap();
        let body = &many[5..];
        assert_eq!(&body[4..8], &[0, 0, 0x9c, 0x40]);

        let too_many = BindMessage {
            portal: String::new(),
            statement: "s1".to_string(),
            param_formats: vec![],
            params: vec![None; usize::from(u16::MAX) + 1],
            result_formats: vec![],
        };
        assert!(matches!(too_many.encode(), Err(PgError::InvalidArgument(_))));

        let parse = ParseMessage {
            name: "s1".to_string(),
            query: "SELECT 1".to_string(),
            param_types: vec![Oid::INT4; usize::from(u16::MAX) + 1],
        };
        assert!(matches!(parse.encode(), Err(PgError::InvalidArgument(_))));

        // ParameterDescription with 40000 parameters
        let mut body = BytesMut::new();
        body.put_u16(40_000);
        for _ in 0..40_000 {
            body.put_u32(23);
        }
        let msg = BackendMessage::decode(&mut frame(b't', &body)).unwrap();
        let BackendMessage::ParameterDescription { type_oids } = msg else {
            panic!("expected ParameterDescription");
        };
        assert_eq!(type_oids.len(), 40_000);
    }

    #[test]
    fn test_describe_and_close_targets() {
        let d = DescribeMessage {
            target: Target::Portal,
            name: String::new(),
        }
        .encode()
        .unwrap();
        assert_eq!(&d[..], &[b'D', 0, 0, 0, 6, b'P', 0]);

        let c = CloseMessage {
            target: Target::Statement,
            name: "x".to_string(),
        }
        .encode()
        .unwrap();
        assert_eq!(&c[..], &[b'C', 0, 0, 0, 7, b'S', b'x', 0]);
        assert_eq!(&SyncMessage.encode().unwrap()[..], &[b'S', 0, 0, 0, 4]);
    }

    #[test]
    fn test_decode_row_description_and_data_row() {
        let mut body = BytesMut::new();
        body.put_i16(1);
        body.put_slice(b"n\0");
        body.put_u32(0);
        body.put_i16(0);
        body.put_u32(23);
        body.put_i16(4);
        body.put_i32(-1);
        body.put_i16(1);
        let msg = BackendMessage::decode(&mut frame(b'T', &body)).unwrap();
        let BackendMessage::RowDescription { fields } = msg else {
            panic!("expected RowDescription");
        };
        assert_eq!(fields, vec![FieldDescription {
            type_size: 4,
            ..FieldDescription::new("n", Oid::INT4, Format::Binary)
        }]);

        let row = [0, 2, 0, 0, 0, 1, b'7', 0xff, 0xff, 0xff, 0xff];
        let msg = BackendMessage::decode(&mut frame(b'D', &row)).unwrap();
        let BackendMessage::DataRow { values } = msg else {
            panic!("expected DataRow");
        };
        assert_eq!(values, vec![Some(Bytes::from_static(b"7")), None]);
    }

    #[test]
    fn test_decode_truncated_body_is_an_error() {
        // DataRow claims a 5-byte value but carries 1
        let row = [0, 1, 0, 0, 0, 5, b'x'];
        let err = BackendMessage::decode(&mut frame(b'D', &row)).unwrap_err();
        assert!(matches!(err, PgError::Protocol(_)));

        let mut short = Bytes::from_static(&[b'Z', 0, 0, 0, 5]);
        assert!(BackendMessage::decode(&mut short).is_err());

        let bad_len = [b'Z', 0, 0, 0, 2, b'I'];
        assert!(BackendMessage::frame_len(&bad_len).is_err());
        assert_eq!(BackendMessage::frame_len(&[b'Z', 0, 0]).unwrap(), None);
    }

    #[test]
    fn test_decode_error_response_fields() {
        let body = b"SERROR\0C42601\0Msyntax error\0P8\0\0";
        let msg = BackendMessage::decode(&mut frame(b'E', body)).unwrap();
        let BackendMessage::ErrorResponse { fields } = msg else {
            panic!("expected ErrorResponse");
        };
        assert_eq!(fields.get(&b'C').map(String::as_str), Some("42601"));
        assert_eq!(fields.get(&b'P').map(String::as_str), Some("8"));
    }

    #[test]
    fn test_ready_for_query_status() {
        let msg = BackendMessage::decode(&mut frame(b'Z', b"T")).unwrap();
        assert!(matches!(
            msg,
            BackendMessage::ReadyForQuery {
                status: TransactionStatus::InTransaction
            }
        ));
        assert!(BackendMessage::decode(&mut frame(b'Z', b"?")).is_err());
    }
}
