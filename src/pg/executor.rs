//! Query execution shared by ad-hoc queries and prepared statements.
//!
//! Parameters are marshaled to text before the connection lock is taken;
//! the wire call and the wrapping of its response into a [`QueryResult`]
//! both happen under the lock.

use std::sync::Arc;

use tracing::debug;

use super::connection::{Connection, LinkFuture};
use super::error::{PgError, PgResult};
use super::result::QueryResult;
use super::statement::{failure, Statement};
use super::transport::{RawResult, WireTransport};
use super::types::{Format, PgValue};

/// Per-call execution options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecOptions {
    /// Format the server should send result values in.
    pub result_format: Format,
    /// Turn a failing server status into `Err(ProtocolFailure)`. When false
    /// the failing result is returned and can be inspected with
    /// [`QueryResult::error`].
    pub throw_error: bool,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            result_format: Format::Text,
            throw_error: true,
        }
    }
}

impl ExecOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn result_format(mut self, format: Format) -> Self {
        self.result_format = format;
        self
    }

    /// Shorthand for `result_format(Format::Binary)`.
    pub fn binary(self) -> Self {
        self.result_format(Format::Binary)
    }

    pub fn throw_error(mut self, throw: bool) -> Self {
        self.throw_error = throw;
        self
    }
}

impl<T: WireTransport> Connection<T> {
    /// Run `query` through the simple query protocol.
    ///
    /// Results are text only; a request for binary results is rejected
    /// before anything is sent. When `query` holds several statements, the
    /// result of the last one is returned.
    pub async fn execute(&self, query: &str, options: &ExecOptions) -> PgResult<QueryResult> {
        if options.result_format != Format::Text {
            return Err(PgError::InvalidArgument(
                "ad-hoc queries return text results only; prepare the statement for binary results"
                    .to_string(),
            ));
        }
        let query = query.to_string();
        debug!(conn = self.session().id(), query = %query, "execute");
        round_trip(self, None, options, move |link| {
            Box::pin(async move { link.exec(&query).await })
        })
        .await
    }
}

impl<T: WireTransport> Statement<T> {
    /// Execute with `params`, one per placeholder.
    pub async fn execute(&self, params: &[PgValue], options: &ExecOptions) -> PgResult<QueryResult> {
        let expected = self.num_params();
        if params.len() != expected {
            return Err(PgError::ParameterCountMismatch {
                expected,
                actual: params.len(),
            });
        }

        let conn = self.connection();
        let texts = marshal_params(conn, params)?;
        let name = self.name().to_string();
        let format = options.result_format;
        debug!(
            conn = conn.session().id(),
            statement = %name,
            params = texts.len(),
            %format,
            "execute prepared"
        );

        round_trip(
            conn,
            Some((self.name(), self.generation())),
            options,
            move |link| Box::pin(async move { link.execute_prepared(&name, &texts, format).await }),
        )
        .await
    }
}

/// Text form of every parameter; `None` is SQL NULL.
fn marshal_params<T: WireTransport>(
    conn: &Connection<T>,
    params: &[PgValue],
) -> PgResult<Vec<Option<String>>> {
    let registry = conn.registry();
    params.iter().map(|value| registry.encode_text(value)).collect()
}

/// One locked wire call whose response becomes a [`QueryResult`] before the
/// lock is released.
async fn round_trip<T, C>(
    conn: &Connection<T>,
    expect: Option<(&str, u64)>,
    options: &ExecOptions,
    call: C,
) -> PgResult<QueryResult>
where
    T: WireTransport,
    C: for<'a> FnOnce(&'a mut T) -> LinkFuture<'a, RawResult> + Send + 'static,
{
    let session = Arc::clone(conn.session());
    let registry = Arc::clone(conn.registry());
    let ExecOptions {
        result_format,
        throw_error,
    } = *options;

    conn.locked(expect, move |link| {
        Box::pin(async move {
            let raw = call(link).await?;
            session.observe(&raw);
            if throw_error && !raw.status.is_ok() {
                return Err(failure("execute", raw));
            }
            QueryResult::new(raw, result_format, registry, session)
        })
    })
    .await
}
