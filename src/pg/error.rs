//! Error types for the PostgreSQL driver.

use std::collections::HashMap;
use std::fmt;
use std::io;

use thiserror::Error;

use super::types::{Format, Oid};

/// Result type for PostgreSQL operations.
pub type PgResult<T> = Result<T, PgError>;

/// Fields of a server `ErrorResponse` (or a failing result status).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerError {
    pub severity: String,
    /// SQLSTATE code, e.g. `42P01`.
    pub code: String,
    pub message: String,
    pub detail: Option<String>,
    pub hint: Option<String>,
    /// 1-based character position in the query text.
    pub position: Option<u32>,
}

impl ServerError {
    /// Build from the raw field map of an `ErrorResponse`.
    pub fn from_fields(fields: &HashMap<u8, String>) -> Self {
        Self {
            severity: fields.get(&b'S').cloned().unwrap_or_default(),
            code: fields.get(&b'C').cloned().unwrap_or_default(),
            message: fields.get(&b'M').cloned().unwrap_or_default(),
            detail: fields.get(&b'D').cloned(),
            hint: fields.get(&b'H').cloned(),
            position: fields.get(&b'P').and_then(|p| p.parse().ok()),
        }
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.severity, self.message, self.code)?;
        if let Some(d) = &self.detail {
            write!(f, "\nDetail: {}", d)?;
        }
        if let Some(h) = &self.hint {
            write!(f, "\nHint: {}", h)?;
        }
        Ok(())
    }
}

/// Errors that can occur during PostgreSQL operations.
#[derive(Error, Debug)]
pub enum PgError {
    /// Operation attempted after `close()` or after the link failed.
    #[error("connection is closed")]
    ConnectionClosed,

    /// The server reported a failing status for a prepare, describe or execute.
    #[error("{operation} failed: {error}")]
    ProtocolFailure {
        operation: &'static str,
        error: ServerError,
    },

    /// Statement prepared in a session the connection has since reset.
    #[error("prepared statement {name} belongs to session {prepared_in}, connection is at session {current}")]
    StaleStatement {
        name: String,
        prepared_in: u64,
        current: u64,
    },

    /// No codec registered for a type/format pair.
    #[error("no {format} codec registered for type {oid}{}", at_column(.column))]
    UnknownType {
        oid: Oid,
        format: Format,
        column: Option<usize>,
    },

    /// Payload bytes did not match the type's wire encoding.
    #[error("malformed payload for type {oid}{}: {reason}", at_column(.column))]
    MalformedPayload {
        oid: Oid,
        column: Option<usize>,
        reason: String,
    },

    #[error("statement expects {expected} parameters, got {actual}")]
    ParameterCountMismatch { expected: usize, actual: usize },

    /// I/O error on the underlying link.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Unexpected message, framing error, or desynchronized link.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A complete response whose shape does not fit the request. The link
    /// itself is still in sync.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("column {0:?} not found")]
    ColumnNotFound(String),

    #[error("column index {index} out of range (result has {count} columns)")]
    ColumnIndexOutOfRange { index: usize, count: usize },

    /// A decoded value could not be converted to the requested Rust type.
    #[error("cannot convert {actual} value to {target}")]
    Conversion {
        actual: &'static str,
        target: &'static str,
    },
}

impl PgError {
    /// Shorthand for a payload error before the column is known.
    pub fn malformed(oid: Oid, reason: impl Into<String>) -> Self {
        PgError::MalformedPayload {
            oid,
            column: None,
            reason: reason.into(),
        }
    }

    /// Whether the link can no longer be trusted after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PgError::Io(_) | PgError::Protocol(_))
    }

    /// Attach a 1-based column number to codec errors.
    pub(crate) fn with_column(self, number: usize) -> Self {
        match self {
            PgError::UnknownType { oid, format, .. } => PgError::UnknownType {
                oid,
                format,
                column: Some(number),
            },
            PgError::MalformedPayload { oid, reason, .. } => PgError::MalformedPayload {
                oid,
                column: Some(number),
                reason,
            },
            other => other,
        }
    }
}

fn at_column(column: &Option<usize>) -> String {
    match column {
        Some(n) => format!(" in column {}", n),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_error_from_fields() {
        let mut fields = HashMap::new();
        fields.insert(b'S', "ERROR".to_string());
        fields.insert(b'C', "42P01".to_string());
        fields.insert(b'M', "relation \"nope\" does not exist".to_string());
        fields.insert(b'P', "15".to_string());

        let err = ServerError::from_fields(&fields);
        assert_eq!(err.code, "42P01");
        assert_eq!(err.position, Some(15));
        assert!(err.detail.is_none());
        assert_eq!(
            err.to_string(),
            "ERROR: relation \"nope\" does not exist (42P01)"
        );
    }

    #[test]
    fn codec_errors_pick_up_column() {
        let err = PgError::malformed(Oid::INT4, "expected 4 bytes, got 3").with_column(2);
        assert_eq!(
            err.to_string(),
            "malformed payload for type 23 in column 2: expected 4 bytes, got 3"
        );

        let err = PgError::UnknownType {
            oid: Oid(99999),
            format: Format::Binary,
            column: None,
        };
        assert_eq!(err.to_string(), "no binary codec registered for type 99999");
    }

    #[test]
    fn only_link_errors_are_fatal() {
        assert!(PgError::Protocol("desync".into()).is_fatal());
        assert!(PgError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "gone")).is_fatal());
        assert!(!PgError::ConnectionClosed.is_fatal());
        assert!(!PgError::UnexpectedResponse("row width".into()).is_fatal());
        assert!(!PgError::ParameterCountMismatch {
            expected: 1,
            actual: 2
        }
        .is_fatal());
    }
}
