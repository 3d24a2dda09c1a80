use std::path::Path;

use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, ToSql};
use tracing::{debug, instrument, trace, warn};

use crate::config::SqliteConfig;
use crate::connection::{Connection, ResultSet};
use crate::error::TableError;
use crate::value::Value;

/// A [`Connection`] backed by SQLite.
///
/// SQLite runs in autocommit mode by default, which would make
/// [`commit`](Connection::commit) and [`rollback`](Connection::rollback)
/// meaningless. Like a DB-API driver, this wrapper opens a deferred
/// transaction before the first statement that writes, and keeps it open
/// until the caller commits or rolls back. If that first statement fails,
/// the transaction it opened is rolled back on the spot. Read-only
/// statements outside a transaction run in autocommit and hold no locks
/// afterwards.
pub struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl SqliteConnection {
    /// Opens (or creates) a SQLite database at the given file path with
    /// default pragmas.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TableError> {
        let path = path.as_ref().to_string_lossy().into_owned();
        Self::open_with(&SqliteConfig::file(path))
    }

    /// Opens an in-memory SQLite database (useful for testing).
    pub fn open_in_memory() -> Result<Self, TableError> {
        Self::open_with(&SqliteConfig::default())
    }

    /// Opens a database and applies the pragmas described by `config`.
    #[instrument(skip_all, fields(path = %config.path))]
    pub fn open_with(config: &SqliteConfig) -> Result<Self, TableError> {
        let conn = if config.is_memory() {
            rusqlite::Connection::open_in_memory()?
        } else {
            rusqlite::Connection::open(&config.path)?
        };
        conn.busy_timeout(config.busy_timeout())?;
        conn.pragma_update(None, "foreign_keys", config.foreign_keys)?;
        if config.wal && !config.is_memory() {
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            debug!("journal_mode = {}", mode);
        }
        debug!("Opened SqliteConnection at {}", config.path);
        Ok(Self { conn })
    }

    /// Wraps an already opened rusqlite connection.
    pub fn from_rusqlite(conn: rusqlite::Connection) -> Self {
        Self { conn }
    }

    /// Runs a batch of `;`-separated statements outside the transaction
    /// handling, typically schema setup.
    pub fn execute_batch(&self, sql: &str) -> Result<(), TableError> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    /// Whether a transaction is currently open.
    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    /// Get a reference to the underlying connection
    pub fn get_ref(&self) -> &rusqlite::Connection {
        &self.conn
    }

    /// Opens a deferred transaction unless one is already open. Returns
    /// whether this call opened it.
    fn begin_if_idle(&self) -> Result<bool, TableError> {
        if !self.conn.is_autocommit() {
            return Ok(false);
        }
        trace!("BEGIN");
        self.conn.execute_batch("BEGIN")?;
        Ok(true)
    }

    /// Passes `result` through. A failed statement that ran inside a
    /// transaction this wrapper opened for it rolls that transaction back,
    /// so the write lock is released. Caller transactions are left alone.
    fn settle<T>(&self, opened: bool, result: Result<T, TableError>) -> Result<T, TableError> {
        if result.is_err() && opened && self.in_transaction() {
            trace!("ROLLBACK (failed statement)");
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!("Rollback after failed statement failed: {}", e);
            }
        }
        result
    }
}

fn query_all(
    stmt: &mut rusqlite::Statement<'_>,
    params: &[Value],
) -> Result<ResultSet, TableError> {
    let width = stmt.column_count();
    if width == 0 {
        stmt.execute(params_from_iter(params.iter()))?;
        return Ok(ResultSet::default());
    }

    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(String::from)
        .collect();
    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(width);
        for i in 0..width {
            values.push(Value::from(row.get_ref(i)?));
        }
        result.push(values);
    }
    Ok(ResultSet {
        columns,
        rows: result,
    })
}

fn execute_each(
    stmt: &mut rusqlite::Statement<'_>,
    batches: &[Vec<Value>],
) -> Result<usize, TableError> {
    let mut changed = 0;
    for params in batches {
        changed += stmt.execute(params_from_iter(params.iter()))?;
    }
    Ok(changed)
}

impl Connection for SqliteConnection {
    fn execute(&self, sql: &str, params: &[Value]) -> Result<ResultSet, TableError> {
        debug!(sql, params = params.len(), "execute");
        let mut stmt = self.conn.prepare_cached(sql)?;
        let opened = !stmt.readonly() && self.begin_if_idle()?;
        let result = query_all(&mut stmt, params);
        self.settle(opened, result)
    }

    fn execute_many(&self, sql: &str, batches: &[Vec<Value>]) -> Result<usize, TableError> {
        debug!(sql, batch = batches.len(), "execute_many");
        let mut stmt = self.conn.prepare_cached(sql)?;
        let opened = !stmt.readonly() && self.begin_if_idle()?;
        let result = execute_each(&mut stmt, batches);
        self.settle(opened, result)
    }

    fn commit(&self) -> Result<(), TableError> {
        if self.in_transaction() {
            trace!("COMMIT");
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    fn rollback(&self) -> Result<(), TableError> {
        if self.in_transaction() {
            trace!("ROLLBACK");
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Integer(n) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*n)),
            Value::Real(f) => ToSqlOutput::Owned(rusqlite::types::Value::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(val: ValueRef<'_>) -> Self {
        match val {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(n) => Value::Integer(n),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch() -> SqliteConnection {
        let conn = SqliteConnection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE kv (k TEXT PRIMARY KEY, v INTEGER)")
            .unwrap();
        conn
    }

    #[test]
    fn reads_do_not_open_a_transaction() {
        let conn = scratch();
        let rs = conn.execute("SELECT COUNT(*) FROM kv", &[]).unwrap();
        assert_eq!(rs.columns, vec!["COUNT(*)".to_string()]);
        assert_eq!(rs.scalar(), Some(&Value::Integer(0)));
        assert!(!conn.in_transaction());
    }

    #[test]
    fn writes_stay_pending_until_commit() {
        let conn = scratch();
        conn.execute("INSERT INTO kv (k, v) VALUES (?, ?)", &[Value::from("a"), Value::from(1)])
            .unwrap();
        assert!(conn.in_transaction());
        conn.rollback().unwrap();
        assert!(!conn.in_transaction());
        let rs = conn.execute("SELECT COUNT(*) FROM kv", &[]).unwrap();
        assert_eq!(rs.scalar(), Some(&Value::Integer(0)));

        conn.execute_many(
            "INSERT INTO kv (k, v) VALUES (?, ?)",
            &[vec![Value::from("a"), Value::from(1)], vec![Value::from("b"), Value::from(2)]],
        )
        .unwrap();
        conn.commit().unwrap();
        conn.rollback().unwrap();
        let rs = conn.execute("SELECT k, v FROM kv ORDER BY k", &[]).unwrap();
        assert_eq!(
            rs.rows,
            vec![
                vec![Value::from("a"), Value::from(1)],
                vec![Value::from("b"), Value::from(2)],
            ]
        );
    }

    #[test]
    fn values_round_trip_through_sqlite() {
        let conn = SqliteConnection::open_in_memory().unwrap();
        let rs = conn
            .execute(
                "SELECT ?, ?, ?, ?, ?",
                &[
                    Value::Null,
                    Value::from(7),
                    Value::from(0.25),
                    Value::from("apple"),
                    Value::from(vec![0u8, 1, 2]),
                ],
            )
            .unwrap();
        assert_eq!(
            rs.rows[0],
            vec![
                Value::Null,
                Value::Integer(7),
                Value::Real(0.25),
                Value::Text("apple".into()),
                Value::Blob(vec![0, 1, 2]),
            ]
        );
    }

    #[test]
    fn constraint_violations_are_classified() {
        let conn = scratch();
        conn.execute("INSERT INTO kv (k, v) VALUES (?, ?)", &[Value::from("a"), Value::from(1)])
            .unwrap();
        let err = conn
            .execute("INSERT INTO kv (k, v) VALUES (?, ?)", &[Value::from("a"), Value::from(2)])
            .unwrap_err();
        assert!(matches!(err, TableError::Constraint(_)), "{err:?}");

        let err = conn.execute("SELECT nope FROM kv", &[]).unwrap_err();
        assert!(matches!(err, TableError::Driver(_)), "{err:?}");
    }

    #[test]
    fn failed_write_releases_its_own_transaction() {
        let conn = scratch();
        conn.execute("INSERT INTO kv (k, v) VALUES (?, ?)", &[Value::from("a"), Value::from(1)])
            .unwrap();
        conn.commit().unwrap();

        // The duplicate insert opened a transaction for itself; the failure closes it.
        let err = conn
            .execute("INSERT INTO kv (k, v) VALUES (?, ?)", &[Value::from("a"), Value::from(2)])
            .unwrap_err();
        assert!(matches!(err, TableError::Constraint(_)), "{err:?}");
        assert!(!conn.in_transaction());

        let err = conn
            .execute_many(
                "INSERT INTO kv (k, v) VALUES (?, ?)",
                &[vec![Value::from("b"), Value::from(2)], vec![Value::from("a"), Value::from(3)]],
            )
            .unwrap_err();
        assert!(matches!(err, TableError::Constraint(_)), "{err:?}");
        assert!(!conn.in_transaction());
        // The partial batch went with it.
        let rs = conn.execute("SELECT COUNT(*) FROM kv", &[]).unwrap();
        assert_eq!(rs.scalar(), Some(&Value::Integer(1)));
    }

    #[test]
    fn failed_write_keeps_a_transaction_already_open() {
        let conn = scratch();
        conn.execute("INSERT INTO kv (k, v) VALUES (?, ?)", &[Value::from("a"), Value::from(1)])
            .unwrap();
        assert!(conn.in_transaction());

        let err = conn
            .execute("INSERT INTO kv (k, v) VALUES (?, ?)", &[Value::from("a"), Value::from(2)])
            .unwrap_err();
        assert!(matches!(err, TableError::Constraint(_)), "{err:?}");
        assert!(conn.in_transaction());

        conn.commit().unwrap();
        let rs = conn.execute("SELECT v FROM kv WHERE k = ?", &[Value::from("a")]).unwrap();
        assert_eq!(rs.scalar(), Some(&Value::Integer(1)));
    }
}
