//! Statement generation.
//!
//! Every SQL string issued by [`Table`](crate::Table) and
//! [`Pivot`](crate::Pivot) is built here, from an ordered list of column
//! names, into `(sql, params)` pairs with positional `?` placeholders.
//! Identifiers are always double-quoted with embedded quotes doubled, so the
//! quoting policy lives in exactly one place.
//!
//! The one exception is search predicates, which are spliced in verbatim.
//! Predicate text is trusted structure, not user input: literal values
//! belong in the bound parameter list.

use crate::error::TableError;
use crate::value::Value;

/// A statement with its parameters, executed once.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

/// A statement executed once per parameter row.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub sql: String,
    pub rows: Vec<Vec<Value>>,
}

impl Batch {
    /// Yields one [`Statement`] per parameter row, for batches whose results
    /// have to be fetched individually.
    pub fn statements(&self) -> impl Iterator<Item = Statement> + '_ {
        self.rows.iter().map(|params| Statement {
            sql: self.sql.clone(),
            params: params.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Quotes an identifier, rejecting empty names.
pub fn quote_ident(name: &str) -> Result<String, TableError> {
    if name.is_empty() {
        return Err(TableError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// `"c1", "c2", ...`
fn column_list<S: AsRef<str>>(columns: &[S]) -> Result<String, TableError> {
    let quoted = columns
        .iter()
        .map(|c| quote_ident(c.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(quoted.join(", "))
}

/// `"c1" = ?, "c2" = ?, ...`
fn set_list<S: AsRef<str>>(columns: &[S]) -> Result<String, TableError> {
    let assignments = columns
        .iter()
        .map(|c| quote_ident(c.as_ref()).map(|q| format!("{q} = ?")))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(assignments.join(", "))
}

/// `?, ?, ...`
fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Builds statements against one table and its primary-key column.
#[derive(Debug, Clone, Copy)]
pub struct StatementBuilder<'a> {
    table: &'a str,
    primary_key: &'a str,
}

impl<'a> StatementBuilder<'a> {
    pub fn new(table: &'a str, primary_key: &'a str) -> Self {
        Self { table, primary_key }
    }

    fn idents(&self) -> Result<(String, String), TableError> {
        Ok((quote_ident(self.table)?, quote_ident(self.primary_key)?))
    }

    fn per_key(sql: String, keys: &[Value]) -> Batch {
        Batch {
            sql,
            rows: keys.iter().map(|k| vec![k.clone()]).collect(),
        }
    }

    /// `SELECT pk FROM t WHERE pk = ?`, one execution per key.
    pub fn lookup(&self, keys: &[Value]) -> Result<Batch, TableError> {
        let (t, pk) = self.idents()?;
        Ok(Self::per_key(
            format!("SELECT {pk} FROM {t} WHERE {pk} = ?"),
            keys,
        ))
    }

    /// `SELECT * FROM t WHERE pk = ?`, one execution per key.
    pub fn fetch_rows(&self, keys: &[Value]) -> Result<Batch, TableError> {
        let (t, pk) = self.idents()?;
        Ok(Self::per_key(
            format!("SELECT * FROM {t} WHERE {pk} = ?"),
            keys,
        ))
    }

    /// `SELECT c1, c2 FROM t WHERE pk = ?`, one execution per key.
    pub fn fetch_columns<S: AsRef<str>>(
        &self,
        columns: &[S],
        keys: &[Value],
    ) -> Result<Batch, TableError> {
        if columns.is_empty() {
            return Err(TableError::EmptySelection);
        }
        let (t, pk) = self.idents()?;
        let cols = column_list(columns)?;
        Ok(Self::per_key(
            format!("SELECT {cols} FROM {t} WHERE {pk} = ?"),
            keys,
        ))
    }

    /// `UPDATE t SET c1 = ?, ... WHERE pk = ?` with the values first and the key appended.
    pub fn update(
        &self,
        key: Value,
        assignments: Vec<(String, Value)>,
    ) -> Result<Statement, TableError> {
        let (columns, mut params): (Vec<String>, Vec<Value>) = assignments.into_iter().unzip();
        let Batch { sql, .. } = self.update_batch(&columns, Vec::new())?;
        params.push(key);
        Ok(Statement { sql, params })
    }

    /// Batched form of [`update`](Self::update). Each entry of `rows` pairs a
    /// key with its values, ordered like `columns`.
    pub fn update_batch<S: AsRef<str>>(
        &self,
        columns: &[S],
        rows: Vec<(Value, Vec<Value>)>,
    ) -> Result<Batch, TableError> {
        if columns.is_empty() {
            return Err(TableError::EmptyWrite);
        }
        let (t, pk) = self.idents()?;
        let assignments = set_list(columns)?;
        let rows = rows
            .into_iter()
            .map(|(key, mut values)| {
                if values.len() != columns.len() {
                    return Err(TableError::BatchMismatch {
                        expected: columns.len(),
                        got: values.len(),
                    });
                }
                values.push(key);
                Ok(values)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Batch {
            sql: format!("UPDATE {t} SET {assignments} WHERE {pk} = ?"),
            rows,
        })
    }

    /// `INSERT INTO t (pk, c1, ...) VALUES (?, ?, ...)`. A primary-key entry
    /// among the assignments is dropped: the key argument always wins.
    pub fn insert(
        &self,
        key: Value,
        assignments: Vec<(String, Value)>,
    ) -> Result<Statement, TableError> {
        let t = quote_ident(self.table)?;
        let mut columns = vec![self.primary_key.to_string()];
        let mut params = vec![key];
        for (col, val) in assignments {
            if col != self.primary_key {
                columns.push(col);
                params.push(val);
            }
        }
        Ok(Statement {
            sql: format!(
                "INSERT INTO {t} ({}) VALUES ({})",
                column_list(&columns)?,
                placeholders(columns.len())
            ),
            params,
        })
    }

    /// `DELETE FROM t WHERE pk = ?`, one execution per key.
    pub fn delete(&self, keys: &[Value]) -> Result<Batch, TableError> {
        let (t, pk) = self.idents()?;
        Ok(Self::per_key(format!("DELETE FROM {t} WHERE {pk} = ?"), keys))
    }

    /// `SELECT COUNT(*) FROM t`
    pub fn count(&self) -> Result<Statement, TableError> {
        let t = quote_ident(self.table)?;
        Ok(Statement {
            sql: format!("SELECT COUNT(*) FROM {t}"),
            params: Vec::new(),
        })
    }

    /// `SELECT pk FROM t WHERE <predicate>`, or `SELECT pk FROM t <predicate>`
    /// when `no_where` is set. The predicate is not escaped.
    pub fn search(
        &self,
        predicate: &str,
        params: &[Value],
        no_where: bool,
    ) -> Result<Statement, TableError> {
        let (t, pk) = self.idents()?;
        let sql = if no_where {
            format!("SELECT {pk} FROM {t} {predicate}")
        } else {
            format!("SELECT {pk} FROM {t} WHERE {predicate}")
        };
        Ok(Statement {
            sql: sql.trim_end().to_string(),
            params: params.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sales() -> StatementBuilder<'static> {
        StatementBuilder::new("sales", "transaction_id")
    }

    #[test]
    fn quoting_doubles_embedded_quotes() {
        assert_eq!(quote_ident("sales").unwrap(), "\"sales\"");
        assert_eq!(quote_ident("we\"ird").unwrap(), "\"we\"\"ird\"");
        assert!(matches!(
            quote_ident(""),
            Err(TableError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn update_orders_values_then_key() {
        let stmt = sales()
            .update(
                Value::from("T121"),
                vec![
                    ("quantity".into(), Value::from(4)),
                    ("discount".into(), Value::from(0.5)),
                ],
            )
            .unwrap();
        assert_eq!(
            stmt.sql,
            "UPDATE \"sales\" SET \"quantity\" = ?, \"discount\" = ? WHERE \"transaction_id\" = ?"
        );
        assert_eq!(
            stmt.params,
            vec![Value::from(4), Value::from(0.5), Value::from("T121")]
        );
    }

    #[test]
    fn insert_leads_with_primary_key() {
        let stmt = sales()
            .insert(
                Value::from("T121"),
                vec![
                    ("quantity".into(), Value::from(4)),
                    ("transaction_id".into(), Value::from("ignored")),
                ],
            )
            .unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO \"sales\" (\"transaction_id\", \"quantity\") VALUES (?, ?)"
        );
        assert_eq!(stmt.params, vec![Value::from("T121"), Value::from(4)]);
    }

    #[test]
    fn per_key_batches() {
        let keys = vec![Value::from("T1"), Value::from("T2")];
        let batch = sales().delete(&keys).unwrap();
        assert_eq!(batch.sql, "DELETE FROM \"sales\" WHERE \"transaction_id\" = ?");
        assert_eq!(batch.rows, vec![vec![Value::from("T1")], vec![Value::from("T2")]]);

        let batch = sales().fetch_columns(&["quantity", "discount"], &keys).unwrap();
        assert_eq!(
            batch.sql,
            "SELECT \"quantity\", \"discount\" FROM \"sales\" WHERE \"transaction_id\" = ?"
        );
        assert_eq!(batch.statements().count(), 2);

        assert_eq!(
            sales().lookup(&keys).unwrap().sql,
            "SELECT \"transaction_id\" FROM \"sales\" WHERE \"transaction_id\" = ?"
        );
        assert_eq!(
            sales().fetch_rows(&keys).unwrap().sql,
            "SELECT * FROM \"sales\" WHERE \"transaction_id\" = ?"
        );
    }

    #[test]
    fn update_batch_checks_row_width() {
        let err = sales()
            .update_batch(&["quantity"], vec![(Value::from("T1"), vec![])])
            .unwrap_err();
        assert!(matches!(
            err,
            TableError::BatchMismatch { expected: 1, got: 0 }
        ));
        assert!(matches!(
            sales().update_batch::<&str>(&[], Vec::new()),
            Err(TableError::EmptyWrite)
        ));
    }

    #[test]
    fn search_with_and_without_where() {
        let stmt = sales()
            .search("product = ?", &[Value::from("Apple")], false)
            .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT \"transaction_id\" FROM \"sales\" WHERE product = ?"
        );
        assert_eq!(stmt.params, vec![Value::from("Apple")]);

        let stmt = sales().search("ORDER BY quantity", &[], true).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT \"transaction_id\" FROM \"sales\" ORDER BY quantity"
        );
        assert_eq!(
            sales().count().unwrap().sql,
            "SELECT COUNT(*) FROM \"sales\""
        );
    }
}
