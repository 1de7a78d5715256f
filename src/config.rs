//! Pool configuration.
//!
//! The core consumes configuration, it does not load it: hosts deserialize
//! these structs from whatever source they use (file, env, plugin config)
//! and hand them to [`WorkerPool::new`](crate::pool::WorkerPool::new).

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::SqlOffloadError;

/// The closed set of supported backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// MySQL-style network backend.
    MySql,
    /// SQLite-style embedded backend.
    Sqlite,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::MySql => f.write_str("mysql"),
            ProviderKind::Sqlite => f.write_str("sqlite"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = SqlOffloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mysql" => Ok(ProviderKind::MySql),
            "sqlite" => Ok(ProviderKind::Sqlite),
            other => Err(SqlOffloadError::ConfigError(format!(
                "unknown database provider `{other}` (expected `mysql` or `sqlite`)"
            ))),
        }
    }
}

/// Connection parameters for the MySQL backend.
#[derive(Clone, Deserialize)]
pub struct MySqlConfig {
    pub host: String,
    #[serde(default = "default_mysql_port")]
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

fn default_mysql_port() -> u16 {
    3306
}

// Manual Debug so credentials never end up in logs.
impl fmt::Debug for MySqlConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MySqlConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

/// Connection parameters for the SQLite backend.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteConfig {
    /// Database file path; `:memory:` opens a private in-memory database
    /// per worker connection.
    pub path: PathBuf,
}

/// Configuration for a [`WorkerPool`](crate::pool::WorkerPool).
///
/// Worker count is fixed at construction; the pool never scales.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// Which backend every worker connects to.
    pub provider: ProviderKind,
    /// Number of worker threads, each owning one connection.
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub mysql: Option<MySqlConfig>,
    #[serde(default)]
    pub sqlite: Option<SqliteConfig>,
}

fn default_workers() -> usize {
    1
}

impl PoolConfig {
    /// MySQL pool configuration with `workers` threads.
    #[must_use]
    pub fn mysql(config: MySqlConfig, workers: usize) -> Self {
        Self {
            provider: ProviderKind::MySql,
            workers,
            mysql: Some(config),
            sqlite: None,
        }
    }

    /// SQLite pool configuration with `workers` threads.
    #[must_use]
    pub fn sqlite(path: impl Into<PathBuf>, workers: usize) -> Self {
        Self {
            provider: ProviderKind::Sqlite,
            workers,
            mysql: None,
            sqlite: Some(SqliteConfig { path: path.into() }),
        }
    }

    /// Check the configuration is internally consistent.
    ///
    /// # Errors
    /// Returns [`SqlOffloadError::ConfigError`] when the worker count is zero
    /// or the section for the selected provider is missing.
    pub fn validate(&self) -> Result<(), SqlOffloadError> {
        if self.workers == 0 {
            return Err(SqlOffloadError::ConfigError(
                "worker count must be at least 1".into(),
            ));
        }
        match self.provider {
            ProviderKind::MySql if self.mysql.is_none() => Err(SqlOffloadError::ConfigError(
                "provider is `mysql` but no [mysql] connection parameters were given".into(),
            )),
            ProviderKind::Sqlite if self.sqlite.is_none() => Err(SqlOffloadError::ConfigError(
                "provider is `sqlite` but no [sqlite] section was given".into(),
            )),
            _ => Ok(()),
        }
    }
}
