//! MySQL backend built on the synchronous `mysql` driver.
//!
//! Worker threads are allowed to block, so the blocking driver is a feature
//! here, not a problem. Timestamps are sent as text rather than relying on
//! the driver's chrono integration, which keeps the value mapping in one
//! place.

use chrono::NaiveDate;
use mysql::prelude::Queryable;
use mysql::{Conn, OptsBuilder, Params, Row, TxOpts, Value};

use crate::config::MySqlConfig;
use crate::error::SqlOffloadError;
use crate::types::{DbRow, ResultSet, RowColumns, RowValues};

/// Open a fresh connection from the configured credentials.
///
/// # Errors
/// Returns the underlying [`mysql::Error`] when the server is unreachable or
/// rejects the credentials.
pub fn connect(config: &MySqlConfig) -> Result<Conn, SqlOffloadError> {
    let opts = OptsBuilder::new()
        .ip_or_hostname(Some(config.host.clone()))
        .tcp_port(config.port)
        .user(Some(config.user.clone()))
        .pass(Some(config.password.clone()))
        .db_name(Some(config.database.clone()));
    Ok(Conn::new(opts)?)
}

/// Liveness probe: a trivial round trip to the server.
pub fn is_alive(conn: &mut Conn) -> bool {
    conn.query_drop("SELECT 1").is_ok()
}

/// Convert task params to MySQL wire values.
#[must_use]
pub fn convert_params(params: &[RowValues]) -> Params {
    if params.is_empty() {
        return Params::Empty;
    }
    let values = params
        .iter()
        .map(|p| match p {
            RowValues::Int(i) => Value::Int(*i),
            RowValues::Float(f) => Value::Double(*f),
            RowValues::Text(s) => Value::Bytes(s.clone().into_bytes()),
            RowValues::Bool(b) => Value::Int(i64::from(*b)),
            RowValues::Timestamp(dt) => {
                Value::Bytes(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string().into_bytes())
            }
            RowValues::Null => Value::NULL,
            RowValues::JSON(json) => Value::Bytes(json.to_string().into_bytes()),
            RowValues::Blob(bytes) => Value::Bytes(bytes.clone()),
        })
        .collect();
    Params::Positional(values)
}

fn from_value(value: Value) -> RowValues {
    match value {
        Value::NULL => RowValues::Null,
        Value::Int(i) => RowValues::Int(i),
        Value::UInt(u) => i64::try_from(u)
            .map(RowValues::Int)
            .unwrap_or_else(|_| RowValues::Text(u.to_string())),
        Value::Float(f) => RowValues::Float(f64::from(f)),
        Value::Double(d) => RowValues::Float(d),
        Value::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(text) => RowValues::Text(text),
            Err(err) => RowValues::Blob(err.into_bytes()),
        },
        Value::Date(year, month, day, hour, minute, second, micros) => {
            NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))
                .and_then(|date| {
                    date.and_hms_micro_opt(
                        u32::from(hour),
                        u32::from(minute),
                        u32::from(second),
                        micros,
                    )
                })
                .map(RowValues::Timestamp)
                .unwrap_or(RowValues::Null)
        }
        Value::Time(negative, days, hours, minutes, seconds, micros) => {
            let sign = if negative { "-" } else { "" };
            let total_hours = u32::from(days) * 24 + u32::from(hours);
            RowValues::Text(format!(
                "{sign}{total_hours:02}:{minutes:02}:{seconds:02}.{micros:06}"
            ))
        }
    }
}

/// Execute a SELECT and return its rows.
///
/// # Errors
/// Returns the underlying [`mysql::Error`] on protocol or statement failure.
pub fn execute_select(
    conn: &mut Conn,
    query: &str,
    params: &[RowValues],
) -> Result<ResultSet, SqlOffloadError> {
    let rows: Vec<Row> = conn.exec(query, convert_params(params))?;
    let mut result_set = ResultSet::with_capacity(rows.len());
    let mut columns = None;
    for row in rows {
        let shared = columns.get_or_insert_with(|| {
            RowColumns::new(
                row.columns_ref()
                    .iter()
                    .map(|col| col.name_str().into_owned())
                    .collect(),
            )
        });
        let values = row.unwrap().into_iter().map(from_value).collect();
        result_set.add_row(DbRow::new(std::sync::Arc::clone(shared), values));
    }
    Ok(result_set)
}

/// Execute a single DML statement and return the affected row count.
///
/// # Errors
/// Returns the underlying [`mysql::Error`] on protocol or statement failure.
pub fn execute_dml(
    conn: &mut Conn,
    query: &str,
    params: &[RowValues],
) -> Result<u64, SqlOffloadError> {
    conn.exec_drop(query, convert_params(params))?;
    Ok(conn.affected_rows())
}

/// Split a batch on the `;` separators that sit outside quoted regions.
/// Tracks `'`, `"`, and backtick quoting, with backslash escapes inside
/// string literals; a doubled closing quote reads as close-then-reopen,
/// which leaves the split points unchanged.
fn split_statements(batch: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut start = 0;
    let mut quote: Option<char> = None;
    let mut chars = batch.char_indices();
    while let Some((i, c)) = chars.next() {
        match quote {
            Some(q) => {
                if c == '\\' && q != '`' {
                    chars.next();
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                ';' => {
                    statements.push(&batch[start..i]);
                    start = i + 1;
                }
                _ => {}
            },
        }
    }
    statements.push(&batch[start..]);
    statements
}

/// Run each statement of a `;`-separated batch inside one transaction.
/// Semicolons inside quoted literals or identifiers do not split.
///
/// # Errors
/// Returns the underlying [`mysql::Error`]; the transaction rolls back when
/// any statement fails.
pub fn execute_batch(conn: &mut Conn, query: &str) -> Result<(), SqlOffloadError> {
    let mut tx = conn.start_transaction(TxOpts::default())?;
    for statement in split_statements(query)
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        tx.query_drop(statement)?;
    }
    tx.commit()?;
    Ok(())
}
