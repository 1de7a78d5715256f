//! Value and result types shared by every backend.
//!
//! Results cross the worker/host thread boundary, so everything here is a
//! plain owned value: a tagged union per cell ([`RowValues`]), rows with
//! shared column metadata ([`DbRow`]), and the task-level output shape
//! ([`TaskOutput`]).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;

/// Values that can be stored in a database row or bound as query parameters.
///
/// The same enum is used for both backends so payloads and callbacks never
/// need to branch on driver types.
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl RowValues {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        if let RowValues::Int(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let RowValues::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    /// Booleans survive a round trip through backends that store them as
    /// integers, so `0`/`1` are accepted here as well.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            RowValues::Bool(value) => Some(*value),
            RowValues::Int(0) => Some(false),
            RowValues::Int(1) => Some(true),
            _ => None,
        }
    }

    /// Timestamps stored as text are parsed with the formats the backends
    /// emit (`YYYY-MM-DD HH:MM:SS` with optional fractional seconds).
    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            RowValues::Timestamp(value) => Some(*value),
            RowValues::Text(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
                .ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }
}

/// A single row of a result set.
///
/// Column names are shared across all rows of a result set behind an `Arc`,
/// with a name-to-index map built once per result set.
#[derive(Debug, Clone)]
pub struct DbRow {
    columns: Arc<RowColumns>,
    values: Vec<RowValues>,
}

/// Column metadata shared by every row of one result set.
#[derive(Debug)]
pub struct RowColumns {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl RowColumns {
    #[must_use]
    pub fn new(names: Vec<String>) -> Arc<Self> {
        let index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Arc::new(Self { names, index })
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl DbRow {
    #[must_use]
    pub fn new(columns: Arc<RowColumns>, values: Vec<RowValues>) -> Self {
        Self { columns, values }
    }

    /// Get a value by column name, or `None` if the column does not exist.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&RowValues> {
        self.columns
            .index
            .get(column)
            .and_then(|&idx| self.values.get(idx))
    }

    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&RowValues> {
        self.values.get(index)
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        self.columns.names()
    }

    #[must_use]
    pub fn values(&self) -> &[RowValues] {
        &self.values
    }
}

/// Rows returned by a SELECT.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    /// The rows returned by the query
    pub rows: Vec<DbRow>,
}

impl ResultSet {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rows: Vec::with_capacity(capacity),
        }
    }

    pub fn add_row(&mut self, row: DbRow) {
        self.rows.push(row);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// The typed result of one finished task, delivered to `on_success`.
///
/// One tag per supported result shape; payloads that produce nothing report
/// [`TaskOutput::None`], which is still a success.
#[derive(Debug, Clone, Default)]
pub enum TaskOutput {
    /// No result value (batch statements, fire-and-forget work).
    #[default]
    None,
    /// Row count reported by a DML statement.
    RowsAffected(u64),
    /// Rows returned by a SELECT.
    Rows(ResultSet),
}

impl TaskOutput {
    /// The result set, if this output carries rows.
    #[must_use]
    pub fn rows(&self) -> Option<&ResultSet> {
        if let TaskOutput::Rows(set) = self {
            Some(set)
        } else {
            None
        }
    }

    /// The affected-row count, if this output carries one.
    #[must_use]
    pub fn rows_affected(&self) -> Option<u64> {
        if let TaskOutput::RowsAffected(count) = self {
            Some(*count)
        } else {
            None
        }
    }
}
