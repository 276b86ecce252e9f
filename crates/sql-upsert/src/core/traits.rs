//! Core traits for dialect-agnostic upserts.
//!
//! - [`Engine`]: hands out pooled connections and reports pool capacity
//! - [`Connection`]: executes SQL text, reads results and bulk-loads rows
//! - [`Dialect`]: SQL syntax strategy (quoting, introspection, merge text)
//!
//! The upsert pipeline only ever talks to these traits, so drivers and the
//! in-memory test engine are interchangeable.

use async_trait::async_trait;

use crate::error::{DbError, DbResult, Result};
use crate::upsert::merge::{MergeSpec, MergeStatements};

use super::schema::TableSchema;
use super::value::{Row, RowSet};

/// A source of database connections.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Database type identifier (e.g. "mysql").
    fn db_type(&self) -> &str;

    /// Maximum number of connections the engine will hand out at once.
    ///
    /// The scheduler never runs more workers than this.
    fn pool_size(&self) -> usize;

    /// Check out a connection. Dropping it returns it to the pool.
    async fn connect(&self) -> Result<Box<dyn Connection>>;
}

/// One checked-out connection.
///
/// Every statement of a single upsert runs on the same connection, so
/// session-scoped objects such as temporary tables stay visible.
#[async_trait]
pub trait Connection: Send {
    /// Execute a statement, returning the number of affected rows.
    async fn execute(&mut self, sql: &str) -> DbResult<u64>;

    /// Run a query and collect its result. Column names are lower-cased.
    async fn query(&mut self, sql: &str) -> DbResult<RowSet>;

    /// Append `rows` to `table` (unquoted, optionally `db.table`).
    ///
    /// `columns` names the positions of each row. The rows go out as one
    /// statement, so a failed call has written nothing. Transport-size
    /// failures must surface with the vendor error code intact so the
    /// dialect can classify them.
    async fn bulk_insert(&mut self, table: &str, columns: &[String], rows: &[Row])
        -> DbResult<u64>;

    /// Open a transaction.
    async fn begin(&mut self) -> DbResult<()>;

    /// Commit the open transaction.
    async fn commit(&mut self) -> DbResult<()>;

    /// Roll back the open transaction.
    async fn rollback(&mut self) -> DbResult<()>;
}

/// SQL dialect strategy.
pub trait Dialect: Send + Sync {
    /// Get the dialect identifier (e.g., "mysql", "mssql").
    fn name(&self) -> &str;

    /// Quote a single identifier (column name).
    fn quote_ident(&self, name: &str) -> Result<String>;

    /// Quote a table name, splitting an optional `db.` / `schema.` prefix.
    fn quote_table(&self, name: &str) -> Result<String>;

    /// Statement listing the columns of `table` in ordinal order.
    fn columns_query(&self, table: &str) -> Result<String>;

    /// Turn the result of [`Dialect::columns_query`] into a schema.
    fn parse_columns(&self, table: &str, result: &RowSet) -> Result<TableSchema>;

    /// Build the DROP/CREATE/merge/ALTER statements for one upsert.
    ///
    /// Dialects without staging-merge support return `UpsertError::Config`.
    fn build_merge(&self, spec: &MergeSpec<'_>) -> Result<MergeStatements>;

    /// Whether an error means the load request was too large to send.
    fn is_payload_too_large(&self, err: &DbError) -> bool;

    /// Most bind parameters one statement may carry, if the server caps it.
    ///
    /// The loader sizes batches so a single `INSERT` never exceeds this.
    fn max_parameters(&self) -> Option<usize> {
        None
    }

    /// Whether [`Dialect::build_merge`] can produce statements at all.
    fn supports_merge(&self) -> bool {
        true
    }

    /// Statement emptying a table.
    fn truncate_sql(&self, table: &str) -> Result<String> {
        Ok(format!("TRUNCATE TABLE {}", self.quote_table(table)?))
    }

    /// `SELECT` of the given columns (all when empty) with an optional filter.
    fn select_sql(&self, table: &str, columns: &[String], filter: Option<&str>) -> Result<String> {
        let cols = if columns.is_empty() {
            "*".to_string()
        } else {
            columns
                .iter()
                .map(|c| self.quote_ident(c))
                .collect::<Result<Vec<_>>>()?
                .join(", ")
        };

        let mut sql = format!("SELECT {} FROM {}", cols, self.quote_table(table)?);
        if let Some(filter) = filter.map(str::trim).filter(|f| !f.is_empty()) {
            sql.push_str(" WHERE ");
            sql.push_str(filter);
        }
        Ok(sql)
    }
}
