//! Connection handles and the per-provider connector strategy.
//!
//! Both are enums over the enabled backends, so generic code never touches
//! driver types directly: payloads receive a [`SqlConnection`] and workers
//! drive a [`Provider`].

use crate::config::{PoolConfig, ProviderKind};
use crate::error::SqlOffloadError;

/// A live backend connection owned by exactly one worker thread.
pub enum SqlConnection {
    /// MySQL client connection
    #[cfg(feature = "mysql")]
    MySql(mysql::Conn),
    /// SQLite database connection
    #[cfg(feature = "sqlite")]
    Sqlite(rusqlite::Connection),
}

impl std::fmt::Debug for SqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "mysql")]
            Self::MySql(_) => f.debug_tuple("MySql").finish(),
            #[cfg(feature = "sqlite")]
            Self::Sqlite(_) => f.debug_tuple("Sqlite").finish(),
            #[allow(unreachable_patterns)]
            _ => f.debug_tuple("SqlConnection").finish(),
        }
    }
}

/// How a worker establishes, validates, and tears down its connection.
///
/// Cloned into every worker thread at pool construction.
#[derive(Debug, Clone)]
pub enum Provider {
    #[cfg(feature = "mysql")]
    MySql(crate::config::MySqlConfig),
    #[cfg(feature = "sqlite")]
    Sqlite(crate::config::SqliteConfig),
}

impl Provider {
    /// Build the connector for the provider the configuration selects.
    ///
    /// # Errors
    /// Returns [`SqlOffloadError::ConfigError`] when the configuration is
    /// inconsistent or selects a backend this build does not include.
    pub fn from_config(config: &PoolConfig) -> Result<Self, SqlOffloadError> {
        config.validate()?;
        match config.provider {
            #[cfg(feature = "mysql")]
            ProviderKind::MySql => config
                .mysql
                .clone()
                .map(Provider::MySql)
                .ok_or_else(|| SqlOffloadError::ConfigError("missing [mysql] section".into())),
            #[cfg(feature = "sqlite")]
            ProviderKind::Sqlite => config
                .sqlite
                .clone()
                .map(Provider::Sqlite)
                .ok_or_else(|| SqlOffloadError::ConfigError("missing [sqlite] section".into())),
            #[allow(unreachable_patterns)]
            other => Err(SqlOffloadError::ConfigError(format!(
                "provider `{other}` is not enabled in this build"
            ))),
        }
    }

    /// Open a fresh connection.
    ///
    /// # Errors
    /// Returns [`SqlOffloadError::ConnectionError`] when the backend cannot
    /// be reached or opened; workers retry on this.
    pub fn connect(&self) -> Result<SqlConnection, SqlOffloadError> {
        match self {
            #[cfg(feature = "mysql")]
            Provider::MySql(config) => crate::mysql::connect(config)
                .map(SqlConnection::MySql)
                .map_err(|err| {
                    SqlOffloadError::ConnectionError(format!("mysql connect failed: {err}"))
                }),
            #[cfg(feature = "sqlite")]
            Provider::Sqlite(config) => crate::sqlite::connect(config)
                .map(SqlConnection::Sqlite)
                .map_err(|err| {
                    SqlOffloadError::ConnectionError(format!("sqlite open failed: {err}"))
                }),
            #[allow(unreachable_patterns)]
            _ => Err(SqlOffloadError::ConfigError(
                "no database backend enabled in this build".into(),
            )),
        }
    }

    /// Whether the connection is still usable. Embedded backends are always
    /// alive once open; network backends get a liveness probe.
    pub fn is_alive(&self, conn: &mut SqlConnection) -> bool {
        match conn {
            #[cfg(feature = "mysql")]
            SqlConnection::MySql(conn) => crate::mysql::is_alive(conn),
            #[cfg(feature = "sqlite")]
            SqlConnection::Sqlite(_) => true,
            #[allow(unreachable_patterns)]
            _ => false,
        }
    }

    /// Close the connection, logging rather than surfacing close failures.
    pub fn close(&self, conn: SqlConnection) {
        match conn {
            #[cfg(feature = "mysql")]
            SqlConnection::MySql(conn) => drop(conn),
            #[cfg(feature = "sqlite")]
            SqlConnection::Sqlite(conn) => {
                if let Err((_conn, err)) = conn.close() {
                    tracing::warn!(error = %err, "sqlite connection close failed");
                }
            }
            #[allow(unreachable_patterns)]
            _ => {}
        }
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::config::PoolConfig;

    #[test]
    fn builds_sqlite_provider_from_config() {
        let config = PoolConfig::sqlite(":memory:", 2);
        let provider = Provider::from_config(&config).expect("provider");
        let mut conn = provider.connect().expect("connect");
        assert!(provider.is_alive(&mut conn));
        provider.close(conn);
    }

    #[test]
    fn rejects_config_without_section() {
        let mut config = PoolConfig::sqlite(":memory:", 1);
        config.sqlite = None;
        assert!(Provider::from_config(&config).is_err());
    }
}
