//! Prepared statements and the per-connection statement cache.
//!
//! - `Statement`: a named server-side statement bound to the session it was
//!   prepared in
//! - `StatementCache`: LRU cache behind `Connection::prepare_cached`

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tracing::debug;

use super::connection::Connection;
use super::error::{PgError, PgResult};
use super::result::QueryResult;
use super::transport::{RawResult, WireTransport};
use super::types::{Format, Oid};
use super::wire::PgWire;

/// Name prefix for statements this driver prepares.
pub const STATEMENT_PREFIX: &str = "__pgd";

// ============================================================================
// Statement
// ============================================================================

/// Shared part of a statement; cached statements hand out clones of it.
#[derive(Debug)]
pub(crate) struct StatementCore {
    name: String,
    query: String,
    /// Describe response: parameter types and result columns.
    description: QueryResult,
    generation: u64,
}

impl StatementCore {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }
}

/// A prepared statement.
///
/// Valid only in the session it was prepared in: after the connection is
/// reset every call that reaches the server fails with
/// [`PgError::StaleStatement`]. Dropping a statement does not release it on
/// the server; the session end does, or [`Statement::deallocate`].
pub struct Statement<T: WireTransport = PgWire> {
    conn: Connection<T>,
    core: Arc<StatementCore>,
}

impl<T: WireTransport> Clone for Statement<T> {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            core: Arc::clone(&self.core),
        }
    }
}

impl<T: WireTransport> Statement<T> {
    /// Prepare `query` on `conn` and describe it, both under one lock.
    pub async fn prepare(conn: &Connection<T>, query: &str) -> PgResult<Self> {
        let name = conn.unique_id(STATEMENT_PREFIX);
        let session = Arc::clone(conn.session());
        let registry = Arc::clone(conn.registry());
        let query = query.to_string();

        let core: StatementCore = conn
            .locked(None, move |link| {
                Box::pin(async move {
                    let prepared = link.prepare(&name, &query).await?;
                    session.observe(&prepared);
                    if !prepared.status.is_ok() {
                        return Err(failure("prepare", prepared));
                    }

                    let described = link.describe_prepared(&name).await?;
                    session.observe(&described);
                    if !described.status.is_ok() {
                        return Err(failure("describe", described));
                    }

                    let generation = session.generation();
                    let description = QueryResult::new(described, Format::Text, registry, session)?;
                    Ok(StatementCore {
                        name,
                        query,
                        description,
                        generation,
                    })
                })
            })
            .await?;

        debug!(
            conn = conn.session().id(),
            statement = %core.name,
            params = core.description.param_types().len(),
            columns = core.description.num_columns(),
            "prepared statement"
        );
        Ok(Self::from_core(conn.clone(), Arc::new(core)))
    }

    pub(crate) fn from_core(conn: Connection<T>, core: Arc<StatementCore>) -> Self {
        Self { conn, core }
    }

    pub(crate) fn core(&self) -> Arc<StatementCore> {
        Arc::clone(&self.core)
    }

    pub(crate) fn connection(&self) -> &Connection<T> {
        &self.conn
    }

    /// Server-side name (`__pgd_<n>`).
    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn query(&self) -> &str {
        &self.core.query
    }

    /// The describe result this statement's metadata comes from.
    pub fn description(&self) -> &QueryResult {
        &self.core.description
    }

    /// Session generation the statement was prepared in.
    pub fn generation(&self) -> u64 {
        self.core.generation
    }

    /// True once the connection has been reset since `prepare`.
    pub fn is_stale(&self) -> bool {
        self.conn.generation() != self.core.generation
    }

    pub fn num_params(&self) -> usize {
        self.core.description.param_types().len()
    }

    pub fn param_types(&self) -> &[Oid] {
        self.core.description.param_types()
    }

    pub fn num_columns(&self) -> usize {
        self.core.description.num_columns()
    }

    /// Name of result column `n` (1-based).
    pub fn column_name(&self, n: usize) -> PgResult<&str> {
        self.core.description.column_name(n)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.core.description.column_names()
    }

    /// 1-based number of the result column called `name`.
    pub fn column_number(&self, name: &str) -> PgResult<usize> {
        self.core.description.column_number(name)
    }

    pub fn column_types(&self) -> Vec<Oid> {
        self.core.description.column_types()
    }

    /// Release the statement on the server.
    pub async fn deallocate(self) -> PgResult<()> {
        let name = self.core.name.clone();
        let session = Arc::clone(self.conn.session());
        let expect = Some((self.core.name.as_str(), self.core.generation));

        self.conn
            .locked(expect, move |link| {
                Box::pin(async move {
                    let raw = link.deallocate(&name).await?;
                    session.observe(&raw);
                    if !raw.status.is_ok() {
                        return Err(failure("deallocate", raw));
                    }
                    Ok(())
                })
            })
            .await?;

        self.conn.forget_cached(&self.core.query, &self.core.name);
        debug!(conn = self.conn.session().id(), statement = %self.core.name, "deallocated statement");
        Ok(())
    }
}

impl<T: WireTransport> std::fmt::Debug for Statement<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("name", &self.core.name)
            .field("query", &self.core.query)
            .field("param_types", &self.param_types())
            .field("columns", &self.column_names())
            .field("generation", &self.core.generation)
            .finish()
    }
}

/// Typed error for a failing server status during `operation`.
pub(crate) fn failure(operation: &'static str, raw: RawResult) -> PgError {
    PgError::ProtocolFailure {
        operation,
        error: raw.error.unwrap_or_default(),
    }
}

// ============================================================================
// Statement Cache
// ============================================================================

/// LRU cache of prepared statements keyed by query text.
///
/// Evicted statements are not deallocated; they stay valid for anyone still
/// holding them and the server drops them with the session.
pub(crate) struct StatementCache {
    cache: LruCache<String, Arc<StatementCore>>,
}

impl StatementCache {
    /// A capacity of 0 is treated as 1.
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
        }
    }

    /// Look up a statement and mark it as recently used.
    pub(crate) fn get(&mut self, query: &str) -> Option<Arc<StatementCore>> {
        self.cache.get(query).cloned()
    }

    /// Name of the statement cached for `query`, without touching the LRU
    /// order.
    pub(crate) fn peek_name(&self, query: &str) -> Option<&str> {
        self.cache.peek(query).map(|core| core.name.as_str())
    }

    /// Insert a statement, returning the name of the one evicted to make
    /// room (replacing the entry for the same query is not an eviction).
    pub(crate) fn insert(&mut self, query: String, core: Arc<StatementCore>) -> Option<String> {
        match self.cache.push(query, core) {
            Some((old_query, old)) if !self.cache.contains(&old_query) => Some(old.name.clone()),
            _ => None,
        }
    }

    pub(crate) fn remove(&mut self, query: &str) -> Option<Arc<StatementCore>> {
        self.cache.pop(query)
    }

    pub(crate) fn len(&self) -> usize {
        self.cache.len()
    }

    pub(crate) fn clear(&mut self) {
        self.cache.clear();
    }
}
