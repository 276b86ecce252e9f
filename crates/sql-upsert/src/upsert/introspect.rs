//! Target table introspection.

use tracing::debug;

use crate::core::schema::TableSchema;
use crate::core::traits::{Connection, Dialect};
use crate::error::{Result, UpsertError};

/// Reads a table's columns through the dialect's listing query.
///
/// Nothing is cached: every call hits the database so a schema change
/// between two upserts is always seen.
pub struct SchemaIntrospector<'a> {
    dialect: &'a dyn Dialect,
}

impl<'a> SchemaIntrospector<'a> {
    pub fn new(dialect: &'a dyn Dialect) -> Self {
        Self { dialect }
    }

    /// Fetch the ordered, lower-cased column list of `table`.
    ///
    /// # Errors
    ///
    /// `UpsertError::Schema` when the listing query fails or returns nothing
    /// usable (missing table, lost connection).
    pub async fn columns(&self, conn: &mut dyn Connection, table: &str) -> Result<TableSchema> {
        let sql = self.dialect.columns_query(table)?;
        debug!("Introspecting {}: {}", table, sql);

        let listing = conn
            .query(&sql)
            .await
            .map_err(|e| UpsertError::schema(table, e.to_string()))?;

        self.dialect.parse_columns(table, &listing)
    }
}
