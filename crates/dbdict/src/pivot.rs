//! Column-scoped, batched access over a fixed set of keys.
//!
//! A [`Pivot`] is what indexing a [`Table`] produces: a cheap view holding
//! the table reference and an ordered list of keys. Reads run one `SELECT`
//! per key; writes run one batched `UPDATE` and commit once.
//!
//! The named accessors (`get_value`, `get_values`, `get_column`,
//! `get_columns`) each return one fixed shape. [`Pivot::select`] keeps the
//! shape-dependent collapsing of dictionary-style indexing, expressed as
//! the [`Selection`] enum.

use std::collections::HashSet;
use std::fmt;

use serde::ser::{SerializeSeq, Serializer};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::connection::Connection;
use crate::error::TableError;
use crate::table::Table;
use crate::value::{Row, Value};

/// Result of fetching a set of columns for one key.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// A single column unwrapped to its value.
    Scalar(Value),
    /// All requested columns in order, or `None` when the row does not exist.
    Tuple(Option<Vec<Value>>),
}

/// Collapsed result of [`Pivot::select`].
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// The pivot has no keys.
    Empty,
    /// The pivot has exactly one key; its cell is returned unwrapped.
    One(Cell),
    /// One cell per key, in key order.
    Many(Vec<Cell>),
}

/// Result of [`Pivot::to_dict`].
#[derive(Debug, Clone, PartialEq)]
pub enum Rows {
    /// The only row, without its key.
    Single(Row),
    /// `(key, row)` pairs in first-seen key order. Missing rows are empty.
    Keyed(Vec<(Value, Row)>),
}

/// `Single` serializes as the row itself. `Keyed` serializes as an array
/// of `{"key": .., "row": ..}` entries, so keys that print alike (`1` and
/// `"1"`) stay distinct.
impl Serialize for Rows {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Rows::Single(row) => row.serialize(serializer),
            Rows::Keyed(rows) => {
                let mut seq = serializer.serialize_seq(Some(rows.len()))?;
                for (key, row) in rows {
                    seq.serialize_element(&KeyedRow { key, row })?;
                }
                seq.end()
            }
        }
    }
}

#[derive(Serialize)]
struct KeyedRow<'a> {
    key: &'a Value,
    row: &'a Row,
}

/// A view over an ordered set of keys of one [`Table`].
pub struct Pivot<'t, C> {
    table: &'t Table<C>,
    keys: Vec<Value>,
}

impl<'t, C> Pivot<'t, C> {
    pub(crate) fn new(table: &'t Table<C>, keys: Vec<Value>) -> Self {
        Self { table, keys }
    }

    pub fn table(&self) -> &'t Table<C> {
        self.table
    }

    pub fn keys(&self) -> &[Value] {
        &self.keys
    }

    pub fn into_keys(self) -> Vec<Value> {
        self.keys
    }

    /// Whether `key` is part of this view. Does not touch the database.
    pub fn contains(&self, key: impl Into<Value>) -> bool {
        self.keys.contains(&key.into())
    }

    /// One single-key pivot per key, in order.
    pub fn iter(&self) -> Partition<'_, 't, C> {
        Partition {
            table: self.table,
            keys: self.keys.iter(),
        }
    }

    fn single_key(&self) -> Result<Option<&Value>, TableError> {
        match self.keys.as_slice() {
            [] => Ok(None),
            [key] => Ok(Some(key)),
            keys => Err(TableError::NotSingleKey(keys.len())),
        }
    }
}

impl<'t, C: Connection> Pivot<'t, C> {
    /// Fetches `columns` for every key; `None` marks a missing row.
    fn fetch<S: AsRef<str>>(
        &self,
        columns: &[S],
    ) -> Result<Vec<Option<Vec<Value>>>, TableError> {
        let conn = self.table.connection()?;
        let batch = self.table.statements().fetch_columns(columns, &self.keys)?;
        let mut rows = Vec::with_capacity(batch.len());
        for stmt in batch.statements() {
            rows.push(conn.execute(&stmt.sql, &stmt.params)?.into_first());
        }
        Ok(rows)
    }

    fn scalars(&self, column: &str) -> Result<Vec<Value>, TableError> {
        self.fetch(&[column])?
            .into_iter()
            .zip(&self.keys)
            .map(|(row, key)| {
                row.and_then(|values| values.into_iter().next())
                    .ok_or_else(|| TableError::MissingRow { key: key.clone() })
            })
            .collect()
    }

    /// Fetches `columns` for every key and collapses the result the way
    /// dictionary-style indexing does:
    /// - one column without `keep_tuples` unwraps each row to a scalar, and a
    ///   missing row is a [`TableError::MissingRow`];
    /// - otherwise each row is a tuple, `None` when missing;
    /// - a single key returns its cell directly, no keys return
    ///   [`Selection::Empty`].
    #[instrument(skip_all, fields(table = %self.table.name(), keys = self.keys.len()))]
    pub fn select<S: AsRef<str>>(
        &self,
        columns: &[S],
        keep_tuples: bool,
    ) -> Result<Selection, TableError> {
        let mut cells: Vec<Cell> = if columns.len() == 1 && !keep_tuples {
            self.scalars(columns[0].as_ref())?
                .into_iter()
                .map(Cell::Scalar)
                .collect()
        } else {
            self.fetch(columns)?.into_iter().map(Cell::Tuple).collect()
        };
        Ok(match cells.len() {
            0 => Selection::Empty,
            1 => Selection::One(cells.remove(0)),
            _ => Selection::Many(cells),
        })
    }

    /// Value of `column` for the single key of this pivot. `None` when the
    /// pivot is empty.
    pub fn get_value(&self, column: &str) -> Result<Option<Value>, TableError> {
        if self.single_key()?.is_none() {
            return Ok(None);
        }
        Ok(self.scalars(column)?.pop())
    }

    /// Values of `columns` for the single key of this pivot. `None` when the
    /// pivot is empty or the row does not exist.
    pub fn get_values<S: AsRef<str>>(
        &self,
        columns: &[S],
    ) -> Result<Option<Vec<Value>>, TableError> {
        if self.single_key()?.is_none() {
            return Ok(None);
        }
        Ok(self.fetch(columns)?.pop().flatten())
    }

    /// Value of `column` for every key, in key order.
    pub fn get_column(&self, column: &str) -> Result<Vec<Value>, TableError> {
        self.scalars(column)
    }

    /// Values of `columns` for every key, in key order; `None` for missing rows.
    pub fn get_columns<S: AsRef<str>>(
        &self,
        columns: &[S],
    ) -> Result<Vec<Option<Vec<Value>>>, TableError> {
        self.fetch(columns)
    }

    /// Writes `rows[i]` to the columns of the `i`th key, one batched
    /// `UPDATE`, committed once.
    #[instrument(skip_all, fields(table = %self.table.name(), keys = self.keys.len()))]
    pub fn set<S: AsRef<str>>(
        &self,
        columns: &[S],
        rows: Vec<Vec<Value>>,
    ) -> Result<(), TableError> {
        if columns.is_empty() {
            return Err(TableError::EmptyWrite);
        }
        if rows.len() != self.keys.len() {
            return Err(TableError::BatchMismatch {
                expected: self.keys.len(),
                got: rows.len(),
            });
        }
        let conn = self.table.connection()?;
        let batch = self
            .table
            .statements()
            .update_batch(columns, self.keys.iter().cloned().zip(rows).collect())?;
        let updated = conn.execute_many(&batch.sql, &batch.rows)?;
        conn.commit()?;
        debug!("Updated {} rows in {}", updated, self.table.name());
        Ok(())
    }

    /// Writes one value to `column` of the single key.
    pub fn set_value(&self, column: &str, value: impl Into<Value>) -> Result<(), TableError> {
        self.expect_single_key()?;
        self.set(&[column], vec![vec![value.into()]])
    }

    /// Writes `values` to `columns` of the single key.
    pub fn set_values<S, I>(&self, columns: &[S], values: I) -> Result<(), TableError>
    where
        S: AsRef<str>,
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        self.expect_single_key()?;
        self.set(columns, vec![values.into_iter().map(Into::into).collect()])
    }

    /// Writes `values[i]` to `column` of the `i`th key.
    pub fn set_column<I>(&self, column: &str, values: I) -> Result<(), TableError>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let rows = values.into_iter().map(|v| vec![v.into()]).collect();
        self.set(&[column], rows)
    }

    fn expect_single_key(&self) -> Result<(), TableError> {
        match self.single_key()? {
            Some(_) => Ok(()),
            None => Err(TableError::NotSingleKey(0)),
        }
    }

    /// Full rows (minus the primary key) for every key.
    ///
    /// A missing row maps to an empty row, and a repeated key appears once.
    /// With exactly one entry and `keep_key == false` the row is returned
    /// unwrapped as [`Rows::Single`]; note that a missing row and a row with
    /// no other columns then look the same.
    #[instrument(skip_all, fields(table = %self.table.name(), keys = self.keys.len()))]
    pub fn to_dict(&self, keep_key: bool) -> Result<Rows, TableError> {
        let conn = self.table.connection()?;
        let pk = self.table.primary_key();
        let batch = self.table.statements().fetch_rows(&self.keys)?;

        let mut seen = HashSet::with_capacity(self.keys.len());
        let mut rows: Vec<(Value, Row)> = Vec::with_capacity(self.keys.len());
        for (key, stmt) in self.keys.iter().zip(batch.statements()) {
            if !seen.insert(key.key_form()) {
                continue;
            }
            let rs = conn.execute(&stmt.sql, &stmt.params)?;
            let mut row = rs.record(0).unwrap_or_default();
            row.remove(pk);
            rows.push((key.clone(), row));
        }

        if !keep_key && rows.len() == 1 {
            let (_, row) = rows.remove(0);
            return Ok(Rows::Single(row));
        }
        Ok(Rows::Keyed(rows))
    }

    /// [`to_dict`](Self::to_dict) rendered as JSON: an object for
    /// [`Rows::Single`], an array of `{"key", "row"}` entries otherwise.
    pub fn to_json(&self, keep_key: bool) -> Result<serde_json::Value, TableError> {
        let rows = self.to_dict(keep_key)?;
        serde_json::to_value(&rows)
            .map_err(|e| TableError::Serialization(format!("Failed to render rows: {}", e)))
    }

    /// How many of this pivot's keys resolve to an existing row. Repeated
    /// keys count once per occurrence.
    pub fn len(&self) -> Result<usize, TableError> {
        let pk = self.table.primary_key().to_string();
        Ok(self.fetch(&[pk])?.iter().filter(|row| row.is_some()).count())
    }

    /// Whether none of this pivot's keys resolve to an existing row.
    pub fn is_empty(&self) -> Result<bool, TableError> {
        Ok(self.len()? == 0)
    }
}

impl<C> Clone for Pivot<'_, C> {
    fn clone(&self) -> Self {
        Self {
            table: self.table,
            keys: self.keys.clone(),
        }
    }
}

impl<C> fmt::Debug for Pivot<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pivot")
            .field("table", &self.table.name())
            .field("keys", &self.keys)
            .finish()
    }
}

/// Iterator over the single-key pivots of a [`Pivot`].
pub struct Partition<'p, 't, C> {
    table: &'t Table<C>,
    keys: std::slice::Iter<'p, Value>,
}

impl<'p, 't, C> Iterator for Partition<'p, 't, C> {
    type Item = Pivot<'t, C>;

    fn next(&mut self) -> Option<Self::Item> {
        self.keys
            .next()
            .map(|key| Pivot::new(self.table, vec![key.clone()]))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.keys.size_hint()
    }
}

impl<C> ExactSizeIterator for Partition<'_, '_, C> {}

impl<'p, 't, C> IntoIterator for &'p Pivot<'t, C> {
    type Item = Pivot<'t, C>;
    type IntoIter = Partition<'p, 't, C>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
