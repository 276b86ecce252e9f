//! Microsoft SQL Server database driver.
//!
//! - [`MssqlDialect`]: SQL syntax strategy, always available
//! - [`MssqlEngine`]: `tiberius` engine pooled with `bb8`, behind the `mssql` feature

mod dialect;
#[cfg(feature = "mssql")]
mod engine;

pub use dialect::{MssqlDialect, ER_TOO_MANY_PARAMETERS, MAX_PARAMETERS};
#[cfg(feature = "mssql")]
pub use engine::{MssqlConnection, MssqlEngine};
