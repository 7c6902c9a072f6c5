//! Query results.
//!
//! A [`QueryResult`] owns the raw response it was built from and decodes
//! values on demand through the connection's codec registry. Every value in
//! one result shares the format the caller asked for.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use super::codec::CodecRegistry;
use super::connection::Session;
use super::error::{PgError, PgResult, ServerError};
use super::protocol::FieldDescription;
use super::transport::{RawResult, ResponseStatus};
use super::types::{Format, FromValue, Oid, PgValue};

/// Inline capacity for a row's decoded values.
const INLINE_COLUMNS: usize = 8;

/// The result of one server round trip.
pub struct QueryResult {
    raw: RawResult,
    format: Format,
    registry: Arc<CodecRegistry>,
    session: Arc<Session>,
    generation: u64,
}

impl QueryResult {
    /// Wrap a raw response. Fails when the server's field formats or row
    /// widths disagree with what was asked for, since decoding such a
    /// response would mis-type data.
    pub(crate) fn new(
        raw: RawResult,
        format: Format,
        registry: Arc<CodecRegistry>,
        session: Arc<Session>,
    ) -> PgResult<Self> {
        if let Some(field) = raw.fields.iter().find(|f| f.format != format) {
            return Err(PgError::UnexpectedResponse(format!(
                "column {:?} arrived in {} format, {} was requested",
                field.name, field.format, format
            )));
        }
        let width = raw.fields.len();
        if let Some(row) = raw.rows.iter().find(|r| r.len() != width) {
            return Err(PgError::UnexpectedResponse(format!(
                "row has {} values but the result describes {} columns",
                row.len(),
                width
            )));
        }

        let generation = session.generation();
        Ok(Self {
            raw,
            format,
            registry,
            session,
            generation,
        })
    }

    pub fn status(&self) -> ResponseStatus {
        self.raw.status
    }

    pub fn is_ok(&self) -> bool {
        self.raw.status.is_ok()
    }

    /// Server error fields of a failing result.
    pub fn error(&self) -> Option<&ServerError> {
        self.raw.error.as_ref()
    }

    pub fn command_tag(&self) -> Option<&str> {
        self.raw.command_tag.as_deref()
    }

    /// Row count from the command tag (`INSERT 0 3`, `UPDATE 2`, `SELECT 5`).
    pub fn rows_affected(&self) -> Option<u64> {
        self.command_tag()?.rsplit(' ').next()?.parse().ok()
    }

    pub fn num_rows(&self) -> usize {
        self.raw.rows.len()
    }

    pub fn num_columns(&self) -> usize {
        self.raw.fields.len()
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Session generation this result was produced in.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the connection has been reset since this result was produced.
    pub fn is_stale(&self) -> bool {
        self.session.generation() != self.generation
    }

    /// Name of column `n` (1-based).
    pub fn column_name(&self, n: usize) -> PgResult<&str> {
        Ok(&self.field(n)?.name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.raw.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// 1-based number of the column called `name`.
    ///
    /// Follows the server's identifier folding: an unquoted name matches
    /// case-insensitively, a double-quoted one exactly.
    pub fn column_number(&self, name: &str) -> PgResult<usize> {
        column_position(&self.raw.fields, name)
            .map(|i| i + 1)
            .ok_or_else(|| PgError::ColumnNotFound(name.to_string()))
    }

    /// Type OID of column `n` (1-based).
    pub fn column_type(&self, n: usize) -> PgResult<Oid> {
        Ok(self.field(n)?.type_oid)
    }

    pub fn column_types(&self) -> Vec<Oid> {
        self.raw.fields.iter().map(|f| f.type_oid).collect()
    }

    /// Full description of every column.
    pub fn fields(&self) -> &[FieldDescription] {
        &self.raw.fields
    }

    /// Parameter types; only a statement describe fills these in.
    pub fn param_types(&self) -> &[Oid] {
        &self.raw.param_types
    }

    /// Decode the value at `row` (0-based) and `column` (1-based).
    pub fn value(&self, row: usize, column: usize) -> PgResult<PgValue> {
        let field = self.field(column)?;
        let cell = self.cell(row, column)?;
        self.registry
            .decode(field.type_oid, self.format, cell)
            .map_err(|e| e.with_column(column))
    }

    /// Decode and convert the value at `row` (0-based) and `column` (1-based).
    pub fn get<T: FromValue>(&self, row: usize, column: usize) -> PgResult<T> {
        T::from_value(&self.value(row, column)?)
    }

    /// Whether the value at `row` (0-based) and `column` (1-based) is NULL.
    pub fn is_null(&self, row: usize, column: usize) -> PgResult<bool> {
        self.field(column)?;
        Ok(self.cell(row, column)?.is_none())
    }

    /// Row `index` (0-based).
    pub fn row(&self, index: usize) -> PgResult<Row<'_>> {
        self.check_row(index)?;
        Ok(Row {
            result: self,
            index,
        })
    }

    pub fn rows(&self) -> impl ExactSizeIterator<Item = Row<'_>> + '_ {
        (0..self.num_rows()).map(move |index| Row {
            result: self,
            index,
        })
    }

    fn field(&self, n: usize) -> PgResult<&FieldDescription> {
        n.checked_sub(1)
            .and_then(|i| self.raw.fields.get(i))
            .ok_or(PgError::ColumnIndexOutOfRange {
                index: n,
                count: self.raw.fields.len(),
            })
    }

    fn check_row(&self, row: usize) -> PgResult<()> {
        if row >= self.raw.rows.len() {
            return Err(PgError::InvalidArgument(format!(
                "row {} out of range (result has {} rows)",
                row,
                self.raw.rows.len()
            )));
        }
        Ok(())
    }

    fn cell(&self, row: usize, column: usize) -> PgResult<Option<&[u8]>> {
        self.check_row(row)?;
        Ok(self.raw.rows[row][column - 1].as_deref())
    }
}

impl fmt::Debug for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryResult")
            .field("status", &self.raw.status)
            .field("format", &self.format)
            .field("columns", &self.column_names())
            .field("rows", &self.raw.rows.len())
            .field("command_tag", &self.raw.command_tag)
            .field("connection", &self.session.id())
            .field("generation", &self.generation)
            .finish()
    }
}

fn column_position(fields: &[FieldDescription], name: &str) -> Option<usize> {
    if let Some(quoted) = name.strip_prefix('"').and_then(|n| n.strip_suffix('"')) {
        return fields.iter().position(|f| f.name == quoted);
    }
    fields
        .iter()
        .position(|f| f.name == name)
        .or_else(|| fields.iter().position(|f| f.name.eq_ignore_ascii_case(name)))
}

/// One row of a [`QueryResult`]. Positions are 0-based.
#[derive(Clone, Copy)]
pub struct Row<'r> {
    result: &'r QueryResult,
    index: usize,
}

impl<'r> Row<'r> {
    /// Position of this row in its result.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.result.num_columns()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, i: usize) -> PgResult<PgValue> {
        self.result.value(self.index, i + 1)
    }

    pub fn get_by_name(&self, name: &str) -> PgResult<PgValue> {
        let n = self.result.column_number(name)?;
        self.result.value(self.index, n)
    }

    pub fn try_get<T: FromValue>(&self, i: usize) -> PgResult<T> {
        T::from_value(&self.get(i)?)
    }

    pub fn try_get_by_name<T: FromValue>(&self, name: &str) -> PgResult<T> {
        T::from_value(&self.get_by_name(name)?)
    }

    pub fn is_null(&self, i: usize) -> PgResult<bool> {
        self.result.is_null(self.index, i + 1)
    }

    /// Every value of the row, decoded.
    pub fn values(&self) -> PgResult<SmallVec<[PgValue; INLINE_COLUMNS]>> {
        (1..=self.len())
            .map(|n| self.result.value(self.index, n))
            .collect()
    }
}

impl fmt::Debug for Row<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Row")
            .field("index", &self.index)
            .field("values", &self.values())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn text_result(raw: RawResult) -> QueryResult {
        QueryResult::new(
            raw,
            Format::Text,
            Arc::new(CodecRegistry::new()),
            Arc::new(Session::new()),
        )
        .unwrap()
    }

    fn sample() -> QueryResult {
        let raw = RawResult::command("SELECT 2")
            .with_fields(vec![
                FieldDescription::new("id", Oid::INT4, Format::Text),
                FieldDescription::new("Name", Oid::TEXT, Format::Text),
            ])
            .with_rows(vec![
                vec![Some(Bytes::from_static(b"1")), Some(Bytes::from_static(b"ann"))],
                vec![Some(Bytes::from_static(b"2")), None],
            ]);
        text_result(raw)
    }

    #[test]
    fn test_metadata() {
        let result = sample();
        assert_eq!(result.status(), ResponseStatus::TuplesOk);
        assert_eq!(result.num_rows(), 2);
        assert_eq!(result.num_columns(), 2);
        assert_eq!(result.column_name(1).unwrap(), "id");
        assert_eq!(result.column_names(), vec!["id", "Name"]);
        assert_eq!(result.column_types(), vec![Oid::INT4, Oid::TEXT]);
        assert_eq!(result.rows_affected(), Some(2));
        assert!(matches!(
            result.column_name(0),
            Err(PgError::ColumnIndexOutOfRange { index: 0, count: 2 })
        ));
        assert!(result.column_type(3).is_err());
    }

    #[test]
    fn test_column_lookup_folds_unquoted_names() {
        let result = sample();
        assert_eq!(result.column_number("id").unwrap(), 1);
        assert_eq!(result.column_number("name").unwrap(), 2);
        assert_eq!(result.column_number("\"Name\"").unwrap(), 2);
        assert!(matches!(
            result.column_number("\"name\""),
            Err(PgError::ColumnNotFound(_))
        ));
    }

    #[test]
    fn test_values_and_nulls() {
        let result = sample();
        assert_eq!(result.value(0, 1).unwrap(), PgValue::Int4(1));
        assert_eq!(result.get::<String>(0, 2).unwrap(), "ann");
        assert!(result.is_null(1, 2).unwrap());
        assert_eq!(result.get::<Option<String>>(1, 2).unwrap(), None);
        assert!(result.value(2, 1).is_err());

        let rows: Vec<_> = result.rows().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].try_get::<i32>(0).unwrap(), 2);
        assert_eq!(
            rows[0].get_by_name("NAME").unwrap(),
            PgValue::Text("ann".into())
        );
        assert_eq!(
            rows[1].values().unwrap().as_slice(),
            &[PgValue::Int4(2), PgValue::Null]
        );
    }

    #[test]
    fn test_decode_error_names_column() {
        let raw = RawResult::command("SELECT 1")
            .with_fields(vec![FieldDescription::new("n", Oid(424242), Format::Text)])
            .with_rows(vec![vec![Some(Bytes::from_static(b"x"))]]);
        let err = text_result(raw).value(0, 1).unwrap_err();
        assert!(matches!(
            err,
            PgError::UnknownType {
                oid: Oid(424242),
                column: Some(1),
                ..
            }
        ));
    }

    #[test]
    fn test_format_mismatch_is_rejected() {
        let raw = RawResult::command("SELECT 1")
            .with_fields(vec![FieldDescription::new("n", Oid::INT4, Format::Binary)]);
        let err = QueryResult::new(
            raw,
            Format::Text,
            Arc::new(CodecRegistry::new()),
            Arc::new(Session::new()),
        )
        .unwrap_err();
        assert!(matches!(err, PgError::UnexpectedResponse(_)));
        assert!(!err.is_fatal());

        let ragged = RawResult::command("SELECT 1")
            .with_fields(vec![FieldDescription::new("n", Oid::INT4, Format::Text)])
            .with_rows(vec![vec![]]);
        let err = QueryResult::new(
            ragged,
            Format::Text,
            Arc::new(CodecRegistry::new()),
            Arc::new(Session::new()),
        )
        .unwrap_err();
        assert!(matches!(err, PgError::UnexpectedResponse(_)));
    }

    #[test]
    fn test_failed_result() {
        let error = ServerError {
            code: "42P01".into(),
            message: "relation \"nope\" does not exist".into(),
            ..Default::default()
        };
        let result = text_result(RawResult::failed(error));
        assert!(!result.is_ok());
        assert_eq!(result.error().unwrap().code, "42P01");
        assert_eq!(result.num_rows(), 0);
        assert_eq!(result.rows_affected(), None);
    }

    #[test]
    fn test_command_tags() {
        let result = text_result(RawResult::command("INSERT 0 3"));
        assert_eq!(result.rows_affected(), Some(3));
        let result = text_result(RawResult::command("CREATE TABLE"));
        assert_eq!(result.rows_affected(), None);
    }
}
