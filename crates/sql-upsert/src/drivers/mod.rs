//! Database driver implementations.
//!
//! - [`mysql`]: MySQL/MariaDB dialect and `mysql_async` engine
//! - [`mssql`]: SQL Server dialect and `tiberius` engine
//!
//! Dialects are always compiled; the engines behind them are gated by the
//! `mysql` and `mssql` features.
//!
//! # Adding New Databases
//!
//! 1. Create a new module under `drivers/`
//! 2. Implement `Dialect` (and `Engine`/`Connection` behind a feature flag)
//! 3. Add an enum variant to `DialectImpl` and a match arm to [`connect_engine`]

pub mod mssql;
pub mod mysql;

use std::sync::Arc;

pub use mssql::MssqlDialect;
pub use mysql::MysqlDialect;

use crate::config::TargetConfig;
use crate::core::schema::TableSchema;
use crate::core::traits::{Dialect, Engine};
use crate::core::value::RowSet;
use crate::error::{DbError, Result, UpsertError};
use crate::upsert::merge::{MergeSpec, MergeStatements};

/// Enum-based static dispatch for dialects.
///
/// Selected once at construction time from the configured database type.
#[derive(Debug, Clone)]
pub enum DialectImpl {
    Mysql(MysqlDialect),
    Mssql(MssqlDialect),
}

impl Dialect for DialectImpl {
    fn name(&self) -> &str {
        match self {
            DialectImpl::Mysql(d) => d.name(),
            DialectImpl::Mssql(d) => d.name(),
        }
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        match self {
            DialectImpl::Mysql(d) => d.quote_ident(name),
            DialectImpl::Mssql(d) => d.quote_ident(name),
        }
    }

    fn quote_table(&self, name: &str) -> Result<String> {
        match self {
            DialectImpl::Mysql(d) => d.quote_table(name),
            DialectImpl::Mssql(d) => d.quote_table(name),
        }
    }

    fn columns_query(&self, table: &str) -> Result<String> {
        match self {
            DialectImpl::Mysql(d) => d.columns_query(table),
            DialectImpl::Mssql(d) => d.columns_query(table),
        }
    }

    fn parse_columns(&self, table: &str, result: &RowSet) -> Result<TableSchema> {
        match self {
            DialectImpl::Mysql(d) => d.parse_columns(table, result),
            DialectImpl::Mssql(d) => d.parse_columns(table, result),
        }
    }

    fn build_merge(&self, spec: &MergeSpec<'_>) -> Result<MergeStatements> {
        match self {
            DialectImpl::Mysql(d) => d.build_merge(spec),
            DialectImpl::Mssql(d) => d.build_merge(spec),
        }
    }

    fn is_payload_too_large(&self, err: &DbError) -> bool {
        match self {
            DialectImpl::Mysql(d) => d.is_payload_too_large(err),
            DialectImpl::Mssql(d) => d.is_payload_too_large(err),
        }
    }

    fn max_parameters(&self) -> Option<usize> {
        match self {
            DialectImpl::Mysql(d) => d.max_parameters(),
            DialectImpl::Mssql(d) => d.max_parameters(),
        }
    }

    fn supports_merge(&self) -> bool {
        match self {
            DialectImpl::Mysql(d) => d.supports_merge(),
            DialectImpl::Mssql(d) => d.supports_merge(),
        }
    }
}

impl DialectImpl {
    /// Create a dialect implementation from a database type string.
    ///
    /// # Errors
    ///
    /// Returns an error if the database type is not recognized.
    pub fn from_db_type(db_type: &str) -> Result<Self> {
        match db_type.to_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(DialectImpl::Mysql(MysqlDialect::new())),
            "mssql" | "sqlserver" | "sql_server" => Ok(DialectImpl::Mssql(MssqlDialect::new())),
            other => Err(UpsertError::Config(format!(
                "Unknown database type: '{}'. Supported types: mysql, mssql",
                other
            ))),
        }
    }
}

/// Open the connection pool for a configured target.
///
/// # Errors
///
/// Returns `UpsertError::Config` when the driver for the target type was not
/// compiled in, or a pool error when the first connection fails.
pub async fn connect_engine(config: &TargetConfig, max_connections: usize) -> Result<Arc<dyn Engine>> {
    match DialectImpl::from_db_type(&config.r#type)? {
        #[cfg(feature = "mysql")]
        DialectImpl::Mysql(_) => Ok(Arc::new(mysql::MysqlEngine::new(config, max_connections).await?)),
        #[cfg(feature = "mssql")]
        DialectImpl::Mssql(_) => Ok(Arc::new(mssql::MssqlEngine::new(config, max_connections).await?)),
        #[allow(unreachable_patterns)]
        other => Err(UpsertError::Config(format!(
            "Driver for '{}' is not enabled in this build",
            other.name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_impl_from_db_type() {
        assert_eq!(DialectImpl::from_db_type("MySQL").unwrap().name(), "mysql");
        assert_eq!(DialectImpl::from_db_type("mariadb").unwrap().name(), "mysql");
        assert_eq!(DialectImpl::from_db_type("sqlserver").unwrap().name(), "mssql");
        assert!(matches!(
            DialectImpl::from_db_type("postgres"),
            Err(UpsertError::Config(_))
        ));
    }

    #[test]
    fn test_dialect_impl_dispatch() {
        let dialect = DialectImpl::Mysql(MysqlDialect::new());
        assert_eq!(dialect.quote_ident("table").unwrap(), "`table`");
        assert_eq!(dialect.truncate_sql("db.t").unwrap(), "TRUNCATE TABLE `db`.`t`");

        let dialect = DialectImpl::Mssql(MssqlDialect::new());
        assert_eq!(dialect.quote_ident("table").unwrap(), "[table]");
        assert_eq!(
            dialect.select_sql("t", &["a".into()], Some("a > 1")).unwrap(),
            "SELECT [a] FROM [t] WHERE a > 1"
        );
    }
}
