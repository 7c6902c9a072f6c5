//! The seam between the driver core and whatever carries bytes to a server.
//!
//! The core (connection locking, statements, results) only ever talks to a
//! [`WireTransport`]. [`PgWire`](super::wire::PgWire) is the protocol v3
//! implementation; tests drive the core with an in-memory fake.

use std::future::Future;

use bytes::Bytes;

use super::error::{PgResult, ServerError};
use super::protocol::{FieldDescription, TransactionStatus};
use super::types::{Format, Oid};

/// Outcome class of one server response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    /// The query string was empty.
    EmptyQuery,
    /// Completed without a row set (DDL, DML without RETURNING, describe).
    CommandOk,
    /// Completed with a row set (possibly zero rows).
    TuplesOk,
    /// The server reported an error.
    FatalError,
}

impl ResponseStatus {
    pub fn is_ok(self) -> bool {
        !matches!(self, ResponseStatus::FatalError)
    }
}

/// One server response as handed back by a transport, before any decoding.
#[derive(Debug, Clone)]
pub struct RawResult {
    pub status: ResponseStatus,
    /// Result columns; empty when the response has no row set.
    pub fields: Vec<FieldDescription>,
    /// Parameter types, filled by a statement describe.
    pub param_types: Vec<Oid>,
    pub rows: Vec<Vec<Option<Bytes>>>,
    pub command_tag: Option<String>,
    pub error: Option<ServerError>,
    /// Status from the ReadyForQuery that ended the exchange.
    pub transaction_status: Option<TransactionStatus>,
}

impl RawResult {
    pub fn new(status: ResponseStatus) -> Self {
        Self {
            status,
            fields: Vec::new(),
            param_types: Vec::new(),
            rows: Vec::new(),
            command_tag: None,
            error: None,
            transaction_status: None,
        }
    }

    /// A completed command with no row set.
    pub fn command(tag: impl Into<String>) -> Self {
        Self {
            command_tag: Some(tag.into()),
            ..Self::new(ResponseStatus::CommandOk)
        }
    }

    /// A failing response carrying the server's error fields.
    pub fn failed(error: ServerError) -> Self {
        Self {
            error: Some(error),
            ..Self::new(ResponseStatus::FatalError)
        }
    }

    pub fn with_fields(mut self, fields: Vec<FieldDescription>) -> Self {
        if self.status == ResponseStatus::CommandOk && !fields.is_empty() {
            self.status = ResponseStatus::TuplesOk;
        }
        self.fields = fields;
        self
    }

    pub fn with_param_types(mut self, param_types: Vec<Oid>) -> Self {
        self.param_types = param_types;
        self
    }

    pub fn with_rows(mut self, rows: Vec<Vec<Option<Bytes>>>) -> Self {
        self.rows = rows;
        self
    }
}

/// Wire calls the driver core needs from a link.
///
/// `Err` means the link itself failed (I/O, framing, desync). A server-side
/// error is an `Ok` [`RawResult`] with [`ResponseStatus::FatalError`].
/// Calls are only ever made by the holder of the connection lock.
pub trait WireTransport: Send + 'static {
    /// Create the named prepared statement, letting the server infer
    /// parameter types.
    fn prepare(
        &mut self,
        name: &str,
        query: &str,
    ) -> impl Future<Output = PgResult<RawResult>> + Send;

    /// Describe a prepared statement: parameter types and result columns.
    fn describe_prepared(&mut self, name: &str)
        -> impl Future<Output = PgResult<RawResult>> + Send;

    /// Bind text parameters, execute, and return every row in
    /// `result_format`.
    fn execute_prepared(
        &mut self,
        name: &str,
        params: &[Option<String>],
        result_format: Format,
    ) -> impl Future<Output = PgResult<RawResult>> + Send;

    /// Run a query through the simple protocol (text results). When the
    /// string holds several statements only the last result is returned.
    fn exec(&mut self, query: &str) -> impl Future<Output = PgResult<RawResult>> + Send;

    /// Release a prepared statement.
    fn deallocate(&mut self, name: &str) -> impl Future<Output = PgResult<RawResult>> + Send;

    /// Tear down and re-establish the server session.
    fn reset(&mut self) -> impl Future<Output = PgResult<()>> + Send;

    /// Say goodbye to the server. Errors are the caller's to ignore.
    fn terminate(&mut self) -> impl Future<Output = PgResult<()>> + Send;
}
