//! The unit of submitted work and its completion cell.
//!
//! A [`SqlTask`] is what callers hand to the pool: a boxed payload plus an
//! optional table hint. Internally the pool wraps it in a [`TaskCell`], the
//! one structure a worker thread and the host thread share per task. The
//! worker consumes the payload, writes the outcome, and only then publishes
//! `finished` with Release ordering; the host reads `finished` with Acquire
//! before touching the outcome, so the flag is the single hand-off point.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::connection::SqlConnection;
use crate::error::SqlOffloadError;
use crate::types::{RowValues, TaskOutput};

/// Stable identity of a submitted task; the key of the callback registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One unit of work, run on a worker thread against that worker's
/// connection.
///
/// Implementations consume themselves so owned parameters move into the
/// backend call without cloning. Closures with the matching signature
/// implement this automatically.
pub trait TaskPayload: Send + 'static {
    /// Run the payload to completion, producing the typed output or the
    /// error captured on the task.
    ///
    /// # Errors
    /// Any error returned here is recorded as the task's failure outcome and
    /// delivered through `on_error`; it never stops the worker.
    fn run(
        self: Box<Self>,
        conn: &mut SqlConnection,
        table: Option<&str>,
    ) -> Result<TaskOutput, SqlOffloadError>;
}

impl<F> TaskPayload for F
where
    F: FnOnce(&mut SqlConnection, Option<&str>) -> Result<TaskOutput, SqlOffloadError>
        + Send
        + 'static,
{
    fn run(
        self: Box<Self>,
        conn: &mut SqlConnection,
        table: Option<&str>,
    ) -> Result<TaskOutput, SqlOffloadError> {
        (*self)(conn, table)
    }
}

fn no_backend() -> SqlOffloadError {
    SqlOffloadError::ConfigError("no database backend enabled in this build".into())
}

/// Replace the `{table}` marker with the task's table hint, if any.
fn resolve_table(query: &str, table: Option<&str>) -> String {
    match table {
        Some(name) => query.replace("{table}", name),
        None => query.to_owned(),
    }
}

/// A parameterized SELECT producing [`TaskOutput::Rows`].
pub struct SelectQuery {
    pub query: String,
    pub params: Vec<RowValues>,
}

impl TaskPayload for SelectQuery {
    fn run(
        self: Box<Self>,
        conn: &mut SqlConnection,
        table: Option<&str>,
    ) -> Result<TaskOutput, SqlOffloadError> {
        let query = resolve_table(&self.query, table);
        let rows = match conn {
            #[cfg(feature = "mysql")]
            SqlConnection::MySql(conn) => crate::mysql::execute_select(conn, &query, &self.params)?,
            #[cfg(feature = "sqlite")]
            SqlConnection::Sqlite(conn) => {
                crate::sqlite::execute_select(conn, &query, &self.params)?
            }
            #[allow(unreachable_patterns)]
            _ => return Err(no_backend()),
        };
        Ok(TaskOutput::Rows(rows))
    }
}

/// A parameterized INSERT/UPDATE/DELETE producing
/// [`TaskOutput::RowsAffected`].
pub struct DmlQuery {
    pub query: String,
    pub params: Vec<RowValues>,
}

impl TaskPayload for DmlQuery {
    fn run(
        self: Box<Self>,
        conn: &mut SqlConnection,
        table: Option<&str>,
    ) -> Result<TaskOutput, SqlOffloadError> {
        let query = resolve_table(&self.query, table);
        let affected = match conn {
            #[cfg(feature = "mysql")]
            SqlConnection::MySql(conn) => crate::mysql::execute_dml(conn, &query, &self.params)?,
            #[cfg(feature = "sqlite")]
            SqlConnection::Sqlite(conn) => crate::sqlite::execute_dml(conn, &query, &self.params)?,
            #[allow(unreachable_patterns)]
            _ => return Err(no_backend()),
        };
        Ok(TaskOutput::RowsAffected(affected))
    }
}

/// A batch of statements run in one transaction, producing
/// [`TaskOutput::None`].
pub struct BatchQuery {
    pub query: String,
}

impl TaskPayload for BatchQuery {
    fn run(
        self: Box<Self>,
        conn: &mut SqlConnection,
        table: Option<&str>,
    ) -> Result<TaskOutput, SqlOffloadError> {
        let query = resolve_table(&self.query, table);
        match conn {
            #[cfg(feature = "mysql")]
            SqlConnection::MySql(conn) => crate::mysql::execute_batch(conn, &query)?,
            #[cfg(feature = "sqlite")]
            SqlConnection::Sqlite(conn) => crate::sqlite::execute_batch(conn, &query)?,
            #[allow(unreachable_patterns)]
            _ => return Err(no_backend()),
        }
        Ok(TaskOutput::None)
    }
}

/// A task ready for submission.
pub struct SqlTask {
    payload: Box<dyn TaskPayload>,
    table: Option<String>,
}

impl SqlTask {
    /// Wrap a custom payload.
    #[must_use]
    pub fn new(payload: impl TaskPayload) -> Self {
        Self {
            payload: Box::new(payload),
            table: None,
        }
    }

    /// A SELECT task; rows arrive as [`TaskOutput::Rows`].
    #[must_use]
    pub fn select(query: impl Into<String>, params: Vec<RowValues>) -> Self {
        Self::new(SelectQuery {
            query: query.into(),
            params,
        })
    }

    /// A DML task; the affected-row count arrives as
    /// [`TaskOutput::RowsAffected`].
    #[must_use]
    pub fn dml(query: impl Into<String>, params: Vec<RowValues>) -> Self {
        Self::new(DmlQuery {
            query: query.into(),
            params,
        })
    }

    /// A statement batch task run inside one transaction.
    #[must_use]
    pub fn batch(query: impl Into<String>) -> Self {
        Self::new(BatchQuery {
            query: query.into(),
        })
    }

    /// A task from a closure run against the worker's connection.
    #[must_use]
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnOnce(&mut SqlConnection, Option<&str>) -> Result<TaskOutput, SqlOffloadError>
            + Send
            + 'static,
    {
        Self::new(f)
    }

    /// Attach a table hint; stock payloads substitute it for `{table}` in
    /// their SQL, custom payloads receive it as-is.
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }
}

impl fmt::Debug for SqlTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlTask")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

pub(crate) type TaskOutcome = Result<TaskOutput, SqlOffloadError>;

/// Per-task state shared between exactly two threads: the owning worker and
/// the host.
///
/// Mutation discipline: the worker takes the payload and writes the outcome;
/// the host reads the outcome only after observing `finished`. The queue the
/// cell sits in has its own lock; this cell only synchronizes the outcome
/// hand-off.
pub(crate) struct TaskCell {
    id: TaskId,
    table: Option<String>,
    payload: Mutex<Option<Box<dyn TaskPayload>>>,
    outcome: Mutex<Option<TaskOutcome>>,
    finished: AtomicBool,
}

impl TaskCell {
    pub(crate) fn new(id: TaskId, task: SqlTask) -> Arc<Self> {
        Arc::new(Self {
            id,
            table: task.table,
            payload: Mutex::new(Some(task.payload)),
            outcome: Mutex::new(None),
            finished: AtomicBool::new(false),
        })
    }

    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Worker side: claim the payload for execution. Returns `None` if it
    /// was already claimed, which would indicate a dispatch bug.
    pub(crate) fn take_payload(&self) -> Option<Box<dyn TaskPayload>> {
        self.payload
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Worker side: record the outcome, then publish `finished`. The Release
    /// store pairs with the Acquire load in [`TaskCell::is_finished`], so a
    /// host that sees the flag also sees the outcome.
    pub(crate) fn complete(&self, outcome: TaskOutcome) {
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner) = Some(outcome);
        self.finished.store(true, Ordering::Release);
    }

    /// Host side: take the recorded outcome for delivery. Valid only after
    /// `is_finished` returned true.
    pub(crate) fn take_outcome(&self) -> Option<TaskOutcome> {
        self.outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}
