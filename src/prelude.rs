//! Convenient imports for common functionality.

pub use crate::bridge::HostWakeup;
pub use crate::config::{MySqlConfig, PoolConfig, ProviderKind, SqliteConfig};
pub use crate::connection::{Provider, SqlConnection};
pub use crate::error::SqlOffloadError;
pub use crate::pool::{Callbacks, WorkerPool};
pub use crate::task::{SqlTask, TaskId, TaskPayload};
pub use crate::types::{DbRow, ResultSet, RowValues, TaskOutput};
