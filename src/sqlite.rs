//! SQLite backend: connection handling, parameter conversion, and the
//! select/dml/batch execution primitives used by the stock payloads.

use std::sync::Arc;
use std::time::Duration;

use rusqlite::types::{Value, ValueRef};
use rusqlite::{Connection, Statement, ToSql};

use crate::config::SqliteConfig;
use crate::error::SqlOffloadError;
use crate::types::{DbRow, ResultSet, RowColumns, RowValues};

/// Open the database file and apply the connection defaults every worker
/// relies on (60s busy timeout so concurrent workers queue on locks instead
/// of failing).
///
/// # Errors
/// Returns the underlying [`rusqlite::Error`] when the file cannot be opened.
pub fn connect(config: &SqliteConfig) -> Result<Connection, SqlOffloadError> {
    let conn = Connection::open(&config.path)?;
    conn.busy_timeout(Duration::from_secs(60))?;
    Ok(conn)
}

/// Convert task params to SQLite values.
pub fn convert_params(params: &[RowValues]) -> Vec<Value> {
    params
        .iter()
        .map(|p| match p {
            RowValues::Int(i) => Value::Integer(*i),
            RowValues::Float(f) => Value::Real(*f),
            RowValues::Text(s) => Value::Text(s.clone()),
            RowValues::Bool(b) => Value::Integer(i64::from(*b)),
            RowValues::Timestamp(dt) => Value::Text(dt.format("%F %T%.f").to_string()),
            RowValues::Null => Value::Null,
            RowValues::JSON(json) => Value::Text(json.to_string()),
            RowValues::Blob(bytes) => Value::Blob(bytes.clone()),
        })
        .collect()
}

fn extract_value(row: &rusqlite::Row<'_>, idx: usize) -> Result<RowValues, SqlOffloadError> {
    let value = match row.get_ref(idx)? {
        ValueRef::Null => RowValues::Null,
        ValueRef::Integer(i) => RowValues::Int(i),
        ValueRef::Real(f) => RowValues::Float(f),
        ValueRef::Text(bytes) => RowValues::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => RowValues::Blob(bytes.to_vec()),
    };
    Ok(value)
}

/// Run a prepared statement and collect every row into a [`ResultSet`].
///
/// # Errors
/// Propagates any [`rusqlite::Error`] raised while stepping the statement.
pub fn build_result_set(
    stmt: &mut Statement<'_>,
    params: &[Value],
) -> Result<ResultSet, SqlOffloadError> {
    let param_refs: Vec<&dyn ToSql> = params.iter().map(|v| v as &dyn ToSql).collect();
    let columns = RowColumns::new(stmt.column_names().iter().map(ToString::to_string).collect());

    let mut rows_iter = stmt.query(&param_refs[..])?;
    let mut result_set = ResultSet::default();
    while let Some(row) = rows_iter.next()? {
        let mut values = Vec::with_capacity(columns.names().len());
        for idx in 0..columns.names().len() {
            values.push(extract_value(row, idx)?);
        }
        result_set.add_row(DbRow::new(Arc::clone(&columns), values));
    }
    Ok(result_set)
}

/// Execute a SELECT and return its rows.
///
/// # Errors
/// Propagates any [`rusqlite::Error`] from preparing or running the query.
pub fn execute_select(
    conn: &mut Connection,
    query: &str,
    params: &[RowValues],
) -> Result<ResultSet, SqlOffloadError> {
    let converted = convert_params(params);
    let mut stmt = conn.prepare(query)?;
    build_result_set(&mut stmt, &converted)
}

/// Execute a single DML statement inside a transaction and return the
/// affected row count.
///
/// # Errors
/// Propagates any [`rusqlite::Error`]; the transaction rolls back on failure.
pub fn execute_dml(
    conn: &mut Connection,
    query: &str,
    params: &[RowValues],
) -> Result<u64, SqlOffloadError> {
    let converted = convert_params(params);
    let tx = conn.transaction()?;
    let rows_affected = {
        let param_refs: Vec<&dyn ToSql> = converted.iter().map(|v| v as &dyn ToSql).collect();
        let mut stmt = tx.prepare(query)?;
        stmt.execute(&param_refs[..])?
    };
    tx.commit()?;
    Ok(rows_affected as u64)
}

/// Execute a batch of statements (no parameters) inside one transaction.
///
/// # Errors
/// Propagates any [`rusqlite::Error`]; the transaction rolls back on failure.
pub fn execute_batch(conn: &mut Connection, query: &str) -> Result<(), SqlOffloadError> {
    let tx = conn.transaction()?;
    tx.execute_batch(query)?;
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_conn() -> Connection {
        let config = SqliteConfig {
            path: ":memory:".into(),
        };
        connect(&config).expect("open in-memory database")
    }

    #[test]
    fn select_round_trips_values() {
        let mut conn = memory_conn();
        execute_batch(
            &mut conn,
            "CREATE TABLE t (a INTEGER, b TEXT, c REAL, d BLOB);",
        )
        .expect("create table");
        let affected = execute_dml(
            &mut conn,
            "INSERT INTO t (a, b, c, d) VALUES (?1, ?2, ?3, ?4)",
            &[
                RowValues::Int(42),
                RowValues::Text("hello".into()),
                RowValues::Float(1.5),
                RowValues::Blob(vec![1, 2, 3]),
            ],
        )
        .expect("insert");
        assert_eq!(affected, 1);

        let rows = execute_select(&mut conn, "SELECT a, b, c, d FROM t", &[]).expect("select");
        assert_eq!(rows.len(), 1);
        let row = &rows.rows[0];
        assert_eq!(row.get("a"), Some(&RowValues::Int(42)));
        assert_eq!(row.get("b").and_then(RowValues::as_text), Some("hello"));
        assert_eq!(row.get("c"), Some(&RowValues::Float(1.5)));
        assert_eq!(row.get("d").and_then(RowValues::as_blob), Some(&[1, 2, 3][..]));
    }

    #[test]
    fn dml_failure_rolls_back() {
        let mut conn = memory_conn();
        execute_batch(&mut conn, "CREATE TABLE t (a INTEGER NOT NULL);").expect("create table");
        let result = execute_dml(&mut conn, "INSERT INTO t (a) VALUES (?1)", &[RowValues::Null]);
        assert!(result.is_err());
        let rows = execute_select(&mut conn, "SELECT a FROM t", &[]).expect("select");
        assert!(rows.is_empty());
    }
}
