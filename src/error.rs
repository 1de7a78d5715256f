use thiserror::Error;

/// Errors produced while offloading work to the pool.
///
/// Driver errors pass through transparently; the string-payload variants
/// carry context the drivers cannot express.
#[derive(Debug, Error)]
pub enum SqlOffloadError {
    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[cfg(feature = "mysql")]
    #[error(transparent)]
    MySql(#[from] mysql::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    /// The pool was shut down before the task ran. Delivered through
    /// `on_error` for every task still queued at shutdown.
    #[error("worker pool shut down before the task ran")]
    Shutdown,

    #[error("Other database error: {0}")]
    Other(String),
}
