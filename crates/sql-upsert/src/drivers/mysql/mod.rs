//! MySQL/MariaDB database driver.
//!
//! - [`MysqlDialect`]: SQL syntax strategy, always available
//! - [`MysqlEngine`]: pooled `mysql_async` engine, behind the `mysql` feature
//!
//! # Supported Versions
//!
//! - MySQL 5.7+, 8.0+
//! - MariaDB 10.2+

mod dialect;
#[cfg(feature = "mysql")]
mod engine;

pub use dialect::{MysqlDialect, ER_NET_PACKET_TOO_LARGE, ER_PS_MANY_PARAM, MAX_PLACEHOLDERS};
#[cfg(feature = "mysql")]
pub use engine::{MysqlConnection, MysqlEngine};
