use tracing::{debug, instrument};

use crate::connection::{Connection, ResultSet};
use crate::error::TableError;
use crate::pivot::Pivot;
use crate::statement::{quote_ident, StatementBuilder};
use crate::value::Value;

/// One SQL table, addressed like a dictionary keyed by its primary key.
///
/// A `Table` carries the table identity (name, primary-key column,
/// insert-only policy) and at most one connection. The connection is the
/// table's execution context: a bound `Table` is used from one thread at a
/// time, and other threads get their own handle through [`Table::detach`]
/// and [`Table::connect`]. Nothing connects lazily; every database
/// operation on an unbound table fails with [`TableError::Unbound`].
///
/// Every mutating operation commits before returning.
pub struct Table<C> {
    name: String,
    primary_key: String,
    insert_only: bool,
    connection: Option<C>,
}

impl<C> Table<C> {
    /// Creates an unbound table handle.
    ///
    /// With `insert_only` set, [`Table::set`] always inserts, so writing an
    /// existing key surfaces the driver's constraint violation.
    pub fn new(
        name: impl Into<String>,
        primary_key: impl Into<String>,
        insert_only: bool,
    ) -> Result<Self, TableError> {
        let name = name.into();
        let primary_key = primary_key.into();
        quote_ident(&name)?;
        quote_ident(&primary_key)?;
        Ok(Self {
            name,
            primary_key,
            insert_only,
            connection: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn is_insert_only(&self) -> bool {
        self.insert_only
    }

    /// Binds the connection for this execution context, returning the one
    /// previously bound, if any.
    pub fn connect(&mut self, connection: C) -> Option<C> {
        debug!(table = %self.name, "connect");
        self.connection.replace(connection)
    }

    /// Unbinds and returns the connection.
    pub fn disconnect(&mut self) -> Option<C> {
        self.connection.take()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Returns a handle with the same identity and no connection, for use
    /// in another execution context.
    pub fn detach<D>(&self) -> Table<D> {
        Table {
            name: self.name.clone(),
            primary_key: self.primary_key.clone(),
            insert_only: self.insert_only,
            connection: None,
        }
    }

    /// The bound connection, for statements the caller manages itself.
    pub fn connection(&self) -> Result<&C, TableError> {
        self.connection.as_ref().ok_or_else(|| TableError::Unbound {
            table: self.name.clone(),
        })
    }

    pub(crate) fn statements(&self) -> StatementBuilder<'_> {
        StatementBuilder::new(&self.name, &self.primary_key)
    }

    /// A view over a single key. Does not touch the database.
    pub fn get(&self, key: impl Into<Value>) -> Pivot<'_, C> {
        Pivot::new(self, vec![key.into()])
    }

    /// A view over `keys`, in the given order. Does not touch the database.
    pub fn get_many<I>(&self, keys: I) -> Pivot<'_, C>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        Pivot::new(self, keys.into_iter().map(Into::into).collect())
    }
}

impl<C: Connection> Table<C> {
    /// Whether a row with this key exists.
    pub fn exists(&self, key: impl Into<Value>) -> Result<bool, TableError> {
        let conn = self.connection()?;
        let key = key.into();
        let lookup = self.statements().lookup(std::slice::from_ref(&key))?;
        Ok(!conn.execute(&lookup.sql, &[key])?.is_empty())
    }

    /// Writes `columns` to the row at `key`: an `UPDATE` when the row exists
    /// and the table is not insert-only, an `INSERT` otherwise. Commits.
    #[instrument(skip_all, fields(table = %self.name))]
    pub fn set<I, K, V>(&self, key: impl Into<Value>, columns: I) -> Result<(), TableError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let assignments: Vec<(String, Value)> = columns
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        if assignments.is_empty() {
            return Err(TableError::EmptyWrite);
        }

        let conn = self.connection()?;
        let key = key.into();
        let stmt = if !self.insert_only && self.exists(key.clone())? {
            debug!(key = %key, columns = assignments.len(), "update");
            self.statements().update(key, assignments)?
        } else {
            debug!(key = %key, columns = assignments.len(), "insert");
            self.statements().insert(key, assignments)?
        };
        conn.execute(&stmt.sql, &stmt.params)?;
        conn.commit()
    }

    /// Deletes the row at `key`. Commits.
    pub fn delete(&self, key: impl Into<Value>) -> Result<usize, TableError> {
        self.delete_many([key.into()])
    }

    /// Deletes the rows at `keys` with one batched statement and a single
    /// commit. Returns the number of rows removed.
    #[instrument(skip_all, fields(table = %self.name))]
    pub fn delete_many<I>(&self, keys: I) -> Result<usize, TableError>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let conn = self.connection()?;
        let keys: Vec<Value> = keys.into_iter().map(Into::into).collect();
        let batch = self.statements().delete(&keys)?;
        let deleted = conn.execute_many(&batch.sql, &batch.rows)?;
        conn.commit()?;
        debug!("Deleted {} of {} keys from {}", deleted, keys.len(), self.name);
        Ok(deleted)
    }

    /// Total number of rows in the table.
    pub fn count(&self) -> Result<u64, TableError> {
        let conn = self.connection()?;
        let stmt = self.statements().count()?;
        let rs = conn.execute(&stmt.sql, &stmt.params)?;
        rs.scalar()
            .and_then(Value::as_i64)
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| TableError::Decode(format!("COUNT(*) returned {:?}", rs.scalar())))
    }

    /// Keys of the rows matching `predicate`, in result order.
    ///
    /// `predicate` is everything after `WHERE` and is spliced into the
    /// statement verbatim. It must be trusted text: put literal values in
    /// `params` and refer to them with `?`.
    #[instrument(skip_all, fields(table = %self.name))]
    pub fn search(&self, predicate: &str, params: &[Value]) -> Result<Pivot<'_, C>, TableError> {
        self.search_inner(predicate, params, false)
    }

    /// Like [`search`](Self::search), but `clause` follows the table name
    /// directly, with no `WHERE` inserted. Useful for `ORDER BY` and `LIMIT`
    /// tails. The same trust rules apply.
    #[instrument(skip_all, fields(table = %self.name))]
    pub fn search_clause(
        &self,
        clause: &str,
        params: &[Value],
    ) -> Result<Pivot<'_, C>, TableError> {
        self.search_inner(clause, params, true)
    }

    fn search_inner(
        &self,
        predicate: &str,
        params: &[Value],
        no_where: bool,
    ) -> Result<Pivot<'_, C>, TableError> {
        let conn = self.connection()?;
        let stmt = self.statements().search(predicate, params, no_where)?;
        let rs = conn.execute(&stmt.sql, &stmt.params)?;
        let keys: Vec<Value> = rs
            .rows
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .collect();
        debug!("Search matched {} keys in {}", keys.len(), self.name);
        Ok(Pivot::new(self, keys))
    }

    /// Executes arbitrary parameterized SQL, commits, and returns every row.
    #[instrument(skip_all, fields(table = %self.name))]
    pub fn query(&self, sql: &str, params: &[Value]) -> Result<ResultSet, TableError> {
        let conn = self.connection()?;
        let rs = conn.execute(sql, params)?;
        conn.commit()?;
        Ok(rs)
    }

    /// Rolls back whatever the connection holds uncommitted.
    pub fn rollback(&self) -> Result<(), TableError> {
        self.connection()?.rollback()
    }
}

impl<C> std::fmt::Debug for Table<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("primary_key", &self.primary_key)
            .field("insert_only", &self.insert_only)
            .field("connected", &self.connection.is_some())
            .finish()
    }
}
