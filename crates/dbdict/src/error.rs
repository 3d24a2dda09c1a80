use rusqlite::ffi::ErrorCode;
use thiserror::Error;

use crate::value::Value;

/// Errors that can occur during table and pivot operations.
///
/// Driver failures are passed through untouched: nothing in this crate
/// retries a statement or recovers locally.
#[derive(Debug, Error)]
pub enum TableError {
    /// An operation was attempted before a connection was bound with
    /// [`Table::connect`](crate::Table::connect).
    #[error("Unbound connection: table '{table}' has no connection in this context")]
    Unbound { table: String },

    /// A single-column read targeted a key with no row.
    #[error("Row {key} does not exist")]
    MissingRow { key: Value },

    /// A write was requested with no columns.
    #[error("Empty write: at least one column is required")]
    EmptyWrite,

    /// A read was requested with no columns.
    #[error("Empty selection: at least one column is required")]
    EmptySelection,

    /// A single-key accessor was used on a pivot holding some other number of keys.
    #[error("Expected a single key, pivot holds {0}")]
    NotSingleKey(usize),

    /// The shape of a batch of values does not line up with the keys or columns.
    #[error("Batch mismatch: expected {expected} entries, got {got}")]
    BatchMismatch { expected: usize, got: usize },

    /// A table, key or column name that cannot be used as an identifier.
    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// An unsigned integer too large for SQLite's signed 64-bit INTEGER.
    #[error("Integer {0} does not fit in a signed 64-bit column")]
    IntegerOverflow(u64),

    /// Rows could not be rendered as JSON.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A value came back from the driver in a shape the caller did not expect.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A constraint violation reported by the driver, message kept verbatim.
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// Any other failure reported by the underlying driver.
    #[error("Driver error: {0}")]
    Driver(#[source] rusqlite::Error),
}

impl From<rusqlite::Error> for TableError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(code, msg)
                if code.code == ErrorCode::ConstraintViolation =>
            {
                Self::Constraint(msg.clone().unwrap_or_else(|| code.to_string()))
            }
            _ => Self::Driver(e),
        }
    }
}
