use crate::error::TableError;
use crate::value::{Row, Value};

/// The rows produced by one statement, with their column names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    /// Column names, in result order.
    pub columns: Vec<String>,
    /// Row values, positionally aligned with `columns`.
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The first row, if any (fetch-one).
    pub fn first(&self) -> Option<&[Value]> {
        self.rows.first().map(Vec::as_slice)
    }

    pub fn into_first(self) -> Option<Vec<Value>> {
        self.rows.into_iter().next()
    }

    /// Pairs the `i`th row with the column names.
    pub fn record(&self, i: usize) -> Option<Row> {
        self.rows.get(i).map(|values| {
            self.columns
                .iter()
                .cloned()
                .zip(values.iter().cloned())
                .collect()
        })
    }

    /// First value of the first row, the shape of `COUNT(*)` and friends.
    pub fn scalar(&self) -> Option<&Value> {
        self.first().and_then(|row| row.first())
    }
}

/// A database connection bound to one execution context.
///
/// This is the whole of what the table layer needs from a driver: statement
/// execution with positional `?` binding, batched execution, and explicit
/// transaction control. Implementations must map driver constraint
/// violations to [`TableError::Constraint`].
pub trait Connection {
    /// Executes one statement and returns every row it produced.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<ResultSet, TableError>;

    /// Executes one statement once per parameter row. Returns the total
    /// number of rows changed.
    fn execute_many(&self, sql: &str, batches: &[Vec<Value>]) -> Result<usize, TableError>;

    /// Commits the current transaction, if one is open.
    fn commit(&self) -> Result<(), TableError>;

    /// Rolls back the current transaction, if one is open.
    fn rollback(&self) -> Result<(), TableError>;
}

impl<C: Connection + ?Sized> Connection for Box<C> {
    fn execute(&self, sql: &str, params: &[Value]) -> Result<ResultSet, TableError> {
        (**self).execute(sql, params)
    }

    fn execute_many(&self, sql: &str, batches: &[Vec<Value>]) -> Result<usize, TableError> {
        (**self).execute_many(sql, batches)
    }

    fn commit(&self) -> Result<(), TableError> {
        (**self).commit()
    }

    fn rollback(&self) -> Result<(), TableError> {
        (**self).rollback()
    }
}
