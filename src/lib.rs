//! pgdrive - a PostgreSQL client driver
//!
//! ```ignore
//! use pgdrive::{Connection, ExecOptions, PgValue};
//!
//! let conn = Connection::connect("postgresql://postgres@localhost/postgres").await?;
//! let stmt = conn.prepare("SELECT $1::int + 1").await?;
//! let result = stmt.execute(&[PgValue::Int4(41)], &ExecOptions::new().binary()).await?;
//! assert_eq!(result.get::<i32>(0, 1)?, 42);
//! ```

pub mod pg;

pub use pg::{
    Codec, CodecRegistry, Connection, ExecOptions, Format, FromValue, Oid, PgConfig, PgError,
    PgResult, PgValue, QueryResult, Row, Statement, WireTransport,
};
