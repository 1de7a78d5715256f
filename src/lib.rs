//! Offload blocking MySQL and SQLite work onto a fixed pool of persistent
//! worker threads.
//!
//! Built for hosts that run a single-threaded, tick-driven loop and must
//! never stall on I/O: the host submits tasks with optional callbacks and
//! keeps ticking; each worker thread owns one backend connection and drains
//! its own FIFO queue; finished results come back through a completion
//! bridge the host drains on its own thread, so callbacks always run where
//! the rest of the host state lives.
//!
//! Within one worker, tasks complete in submission order. Across workers
//! there is no ordering guarantee. Once submitted, a task always runs to
//! completion; there is no cancellation and no queue depth limit.
//!
//! ```no_run
//! use sql_offload::prelude::*;
//!
//! fn main() -> Result<(), SqlOffloadError> {
//!     let config = PoolConfig::sqlite("data.db", 2);
//!     let mut pool = WorkerPool::new(&config)?;
//!
//!     pool.submit(SqlTask::batch(
//!         "CREATE TABLE IF NOT EXISTS players (name TEXT, score INTEGER);",
//!     ));
//!     pool.submit_with(
//!         SqlTask::select("SELECT name, score FROM {table}", vec![]).with_table("players"),
//!         Callbacks::new()
//!             .on_success(|output| {
//!                 for row in &output.rows().expect("select returns rows").rows {
//!                     println!("{:?} -> {:?}", row.get("name"), row.get("score"));
//!                 }
//!             })
//!             .on_error(|err| eprintln!("query failed: {err}")),
//!     );
//!
//!     loop {
//!         // ... host tick work ...
//!         pool.process_completions();
//!         # break;
//!     }
//!     pool.shutdown();
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod config;
pub mod connection;
pub mod error;
pub mod pool;
pub mod prelude;
pub mod task;
pub mod types;
mod worker;

#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use crate::bridge::HostWakeup;
pub use crate::config::{MySqlConfig, PoolConfig, ProviderKind, SqliteConfig};
pub use crate::connection::SqlConnection;
pub use crate::error::SqlOffloadError;
pub use crate::pool::{Callbacks, OnError, OnSuccess, WorkerPool};
pub use crate::task::{BatchQuery, DmlQuery, SelectQuery, SqlTask, TaskId, TaskPayload};
pub use crate::types::{DbRow, ResultSet, RowColumns, RowValues, TaskOutput};
