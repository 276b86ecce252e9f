//! # sql-upsert
//!
//! Bulk upsert of tabular data into relational tables.
//!
//! Rows are loaded into a freshly created staging table and moved into the
//! target with one set-based statement:
//!
//! - **Three merge modes**: `update` (column-wise, with a NULL policy),
//!   `ignore` and `replace`
//! - **Adaptive loading** that halves the batch size when the server
//!   rejects a request as too large
//! - **Guaranteed cleanup** of the staging table, even on failure
//! - **Concurrent multi-table upserts** bounded by the connection pool,
//!   with per-table outcomes and cooperative cancellation
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::collections::BTreeMap;
//! use sql_upsert::{Config, RowSet, SqlValue, UpsertClient};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> sql_upsert::Result<()> {
//!     let config = Config::load("upsert.yaml")?;
//!     let client = UpsertClient::from_config(&config).await?;
//!
//!     let mut tables = BTreeMap::new();
//!     tables.insert(
//!         "quotes".to_string(),
//!         RowSet::new(vec!["id".into(), "close".into()], vec![vec![SqlValue::I64(1), SqlValue::F64(9.5)]]),
//!     );
//!
//!     let report = client
//!         .upsert_many(tables, None, client.defaults(), &CancellationToken::new())
//!         .await;
//!     println!("{}", report.to_json()?);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod upsert;

// Re-exports for convenient access
pub use client::UpsertClient;
pub use config::{Config, SchedulerConfig, TargetConfig};
pub use core::{ColumnSpec, Connection, Dialect, Engine, Row, RowSet, SqlValue, TableSchema};
pub use drivers::DialectImpl;
pub use error::{DbError, DbResult, Result, UpsertError};
pub use orchestrator::{ConcurrentUpsertScheduler, UpsertOutcome, UpsertReport};
pub use upsert::{
    NullPolicy, UpsertCoordinator, UpsertMode, UpsertOptions, UpsertRequest, UpsertSummary,
};
