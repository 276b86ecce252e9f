//! SQL Server dialect.
//!
//! Supports introspection, reads, truncation and ad hoc execution. The
//! staging merge is not available for SQL Server.

use crate::core::identifier::{escape_literal, qualify_mssql, quote_mssql, split_qualified};
use crate::core::schema::{ColumnSpec, TableSchema};
use crate::core::traits::Dialect;
use crate::core::value::{RowSet, SqlValue};
use crate::error::{DbError, Result, UpsertError};
use crate::upsert::merge::{MergeSpec, MergeStatements};

/// Too many parameters in one request (limit is 2100).
pub const ER_TOO_MANY_PARAMETERS: u32 = 8003;

/// Parameters sent per request; the server allows 2100, keep headroom.
pub const MAX_PARAMETERS: usize = 2000;

/// SQL Server dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct MssqlDialect;

impl MssqlDialect {
    /// Create a new SQL Server dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MssqlDialect {
    fn name(&self) -> &str {
        "mssql"
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        quote_mssql(name)
    }

    fn quote_table(&self, name: &str) -> Result<String> {
        qualify_mssql(name)
    }

    fn columns_query(&self, table: &str) -> Result<String> {
        // Validate through quoting even though sp_columns takes literals.
        qualify_mssql(table)?;
        Ok(match split_qualified(table) {
            (Some(owner), name) => format!(
                "EXEC sp_columns @table_name = N'{}', @table_owner = N'{}'",
                escape_literal(name),
                escape_literal(owner)
            ),
            (None, name) => format!("EXEC sp_columns @table_name = N'{}'", escape_literal(name)),
        })
    }

    fn parse_columns(&self, table: &str, result: &RowSet) -> Result<TableSchema> {
        let name_idx = result
            .column_index("column_name")
            .ok_or_else(|| UpsertError::schema(table, "sp_columns result has no column_name"))?;
        let type_idx = result
            .column_index("type_name")
            .ok_or_else(|| UpsertError::schema(table, "sp_columns result has no type_name"))?;

        let mut columns = Vec::with_capacity(result.len());
        for row in &result.rows {
            match (
                row.get(name_idx).and_then(SqlValue::as_text),
                row.get(type_idx).and_then(SqlValue::as_text),
            ) {
                (Some(name), Some(data_type)) => columns.push(ColumnSpec::new(name, data_type)),
                _ => return Err(UpsertError::schema(table, "sp_columns returned an empty row")),
            }
        }

        // sp_columns answers an unknown table with an empty result.
        if columns.is_empty() {
            return Err(UpsertError::schema(table, "table does not exist"));
        }

        Ok(TableSchema::new(table, columns))
    }

    fn build_merge(&self, spec: &MergeSpec<'_>) -> Result<MergeStatements> {
        Err(UpsertError::Config(format!(
            "Upsert mode '{}' into {} is not supported for SQL Server targets",
            spec.mode, spec.target
        )))
    }

    fn is_payload_too_large(&self, err: &DbError) -> bool {
        err.code == Some(ER_TOO_MANY_PARAMETERS)
    }

    fn max_parameters(&self) -> Option<usize> {
        Some(MAX_PARAMETERS)
    }

    fn supports_merge(&self) -> bool {
        false
    }
}
