//! PostgreSQL client driver.
//!
//! This module provides a client that:
//! - Serializes every wire call on a connection behind one async lock
//! - Ties prepared statements to the session they were prepared in
//! - Decodes results in text or binary format through a codec registry
//!
//! Architecture:
//! - `codec`: `(oid, format)` codec registry with the built-in types
//! - `types`: OIDs, formats and the `PgValue` model
//! - `result`: Columnar view over one server response
//! - `connection`: Locked link, session generation, statement cache
//! - `statement`: Prepared statements
//! - `executor`: Parameter marshaling and the execute round trip
//! - `transport`: The `WireTransport` seam the core talks to
//! - `protocol`, `wire`, `scram`, `config`: Protocol v3 transport over TCP

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod protocol;
pub mod result;
pub mod scram;
pub mod statement;
pub mod transport;
pub mod types;
pub mod wire;


// Public API re-exports for library consumers
pub use codec::{Codec, CodecRegistry};
pub use config::PgConfig;
pub use connection::{Connection, LinkFuture};
pub use error::{PgError, PgResult, ServerError};
pub use executor::ExecOptions;
pub use protocol::{FieldDescription, TransactionStatus};
pub use result::{QueryResult, Row};
pub use statement::Statement;
pub use transport::{RawResult, ResponseStatus, WireTransport};
pub use types::{ArrayDimension, Format, FromValue, Interval, Oid, PgArray, PgValue};
pub use wire::PgWire;
