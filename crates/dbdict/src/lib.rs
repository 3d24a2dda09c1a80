//! # dbdict
//!
//! Dictionary-style access to a single SQL table keyed by its primary key.
//!
//! A [`Table`] turns key-based operations into parameterized statements:
//! writing a key inserts or updates its row, reading a key looks the row
//! up. Indexing a table yields a [`Pivot`], a view over one or more keys
//! whose column-scoped reads and writes are batched across all of them.
//!
//! Statements use positional `?` placeholders and go through the
//! [`Connection`] trait; [`SqliteConnection`] implements it on top of
//! `rusqlite`.
//!
//! ## Quick start
//!
//! ```no_run
//! use dbdict::{SqliteConnection, Table, Value};
//!
//! # fn main() -> Result<(), dbdict::TableError> {
//! let conn = SqliteConnection::open_in_memory()?;
//! conn.execute_batch(
//!     "CREATE TABLE sales (
//!         transaction_id TEXT PRIMARY KEY,
//!         product TEXT,
//!         quantity INTEGER,
//!         discount REAL
//!     )",
//! )?;
//!
//! let mut sales = Table::new("sales", "transaction_id", false)?;
//! sales.connect(conn);
//!
//! sales.set("T121", [("quantity", Value::from(4)), ("discount", Value::from(0.5))])?;
//! assert_eq!(sales.get("T121").get_value("quantity")?, Some(Value::from(4)));
//!
//! sales.set("T122", [("quantity", 1)])?;
//! sales.get_many(["T121", "T122"]).set_column("quantity", [4, 10])?;
//!
//! let apples = sales.search("product = ?", &[Value::from("Apple")])?;
//! assert!(apples.keys().is_empty());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod pivot;
pub mod sqlite;
pub mod statement;
pub mod table;
pub mod value;

// Re-exports for convenience.
pub use config::SqliteConfig;
pub use connection::{Connection, ResultSet};
pub use error::TableError;
pub use pivot::{Cell, Partition, Pivot, Rows, Selection};
pub use sqlite::SqliteConnection;
pub use statement::{Batch, Statement, StatementBuilder};
pub use table::Table;
pub use value::{Row, Value};
