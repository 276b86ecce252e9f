//! MySQL/MariaDB SQL dialect (Strategy pattern).
//!
//! Provides MySQL-specific SQL for identifier quoting, column introspection
//! and the staging-table merge statements.

use crate::core::identifier::{qualify_mysql, quote_mysql};
use crate::core::schema::{ColumnSpec, TableSchema};
use crate::core::traits::Dialect;
use crate::core::value::{RowSet, SqlValue};
use crate::error::{DbError, Result, UpsertError};
use crate::upsert::merge::{resolve_charset, resolve_engine, MergeSpec, MergeStatements};
use crate::upsert::request::{NullPolicy, UpsertMode};

/// `ER_NET_PACKET_TOO_LARGE`: the request exceeded `max_allowed_packet`.
pub const ER_NET_PACKET_TOO_LARGE: u32 = 1153;

/// `ER_PS_MANY_PARAM`: too many placeholders in one prepared statement.
pub const ER_PS_MANY_PARAM: u32 = 1390;

/// Placeholders allowed in one prepared statement.
pub const MAX_PLACEHOLDERS: usize = 65535;

/// MySQL/MariaDB dialect implementation.
///
/// Compatible with MySQL 5.7+, 8.0+, and MariaDB 10.2+.
#[derive(Debug, Clone, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    /// Create a new MySQL dialect instance.
    pub fn new() -> Self {
        Self
    }

    fn column_list(&self, spec: &MergeSpec<'_>) -> Result<String> {
        Ok(spec
            .columns
            .iter()
            .map(|c| quote_mysql(&c.name))
            .collect::<Result<Vec<_>>>()?
            .join(", "))
    }

    /// `ON DUPLICATE KEY UPDATE` assignment for one column.
    fn assignment(&self, target: &str, column: &str, policy: NullPolicy) -> Result<String> {
        let col = quote_mysql(column)?;
        Ok(match policy {
            NullPolicy::Force => format!("{col} = VALUES({col})"),
            NullPolicy::New => format!("{col} = COALESCE(VALUES({col}), {target}.{col})"),
            NullPolicy::Old => format!("{col} = COALESCE({target}.{col}, VALUES({col}))"),
        })
    }
}

impl Dialect for MysqlDialect {
    fn name(&self) -> &str {
        "mysql"
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        quote_mysql(name)
    }

    fn quote_table(&self, name: &str) -> Result<String> {
        qualify_mysql(name)
    }

    fn columns_query(&self, table: &str) -> Result<String> {
        Ok(format!("SHOW FULL COLUMNS FROM {}", qualify_mysql(table)?))
    }

    fn parse_columns(&self, table: &str, result: &RowSet) -> Result<TableSchema> {
        let field_idx = result
            .column_index("field")
            .ok_or_else(|| UpsertError::schema(table, "column listing has no 'field' column"))?;
        let type_idx = result
            .column_index("type")
            .ok_or_else(|| UpsertError::schema(table, "column listing has no 'type' column"))?;

        let columns = result
            .rows
            .iter()
            .map(|row| {
                let name = row.get(field_idx).and_then(value_text);
                let data_type = row.get(type_idx).and_then(value_text);
                match (name, data_type) {
                    (Some(name), Some(data_type)) => Ok(ColumnSpec::new(name, data_type)),
                    _ => Err(UpsertError::schema(table, "column listing has an empty row")),
                }
            })
            .collect::<Result<Vec<_>>>()?;

        if columns.is_empty() {
            return Err(UpsertError::schema(table, "table has no columns"));
        }

        Ok(TableSchema::new(table, columns))
    }

    fn build_merge(&self, spec: &MergeSpec<'_>) -> Result<MergeStatements> {
        if spec.columns.is_empty() {
            return Err(UpsertError::schema(spec.target, "no columns to merge"));
        }

        let staging = qualify_mysql(spec.staging)?;
        let target = qualify_mysql(spec.target)?;
        let kind = spec.table_kind();

        let drop = format!("DROP {} IF EXISTS {}", kind, staging);

        let col_defs = spec
            .columns
            .iter()
            .map(|c| Ok(format!("{} {} DEFAULT NULL", quote_mysql(&c.name)?, c.data_type)))
            .collect::<Result<Vec<String>>>()?;
        let engine = resolve_engine(spec.engine, spec.temporary)?;
        let charset = resolve_charset(spec.charset)?;
        let create = format!(
            "CREATE {} {} ({}) ENGINE={} DEFAULT CHARSET={}",
            kind,
            staging,
            col_defs.join(", "),
            engine,
            charset
        );

        let cols = self.column_list(spec)?;
        let merge = match spec.mode {
            UpsertMode::Update => {
                let updates = spec
                    .columns
                    .iter()
                    .map(|c| self.assignment(&target, &c.name, spec.null_policy))
                    .collect::<Result<Vec<_>>>()?;
                format!(
                    "INSERT INTO {target} ({cols}) SELECT {cols} FROM {staging} \
                     ON DUPLICATE KEY UPDATE {}",
                    updates.join(", ")
                )
            }
            UpsertMode::Ignore => {
                format!("INSERT IGNORE INTO {target} ({cols}) SELECT {cols} FROM {staging}")
            }
            UpsertMode::Replace => {
                format!("REPLACE INTO {target} ({cols}) SELECT {cols} FROM {staging}")
            }
        };

        let reset_auto_increment = spec
            .reset_auto_increment
            .then(|| format!("ALTER TABLE {} AUTO_INCREMENT = 1", target));

        Ok(MergeStatements {
            drop,
            create,
            merge,
            reset_auto_increment,
        })
    }

    fn is_payload_too_large(&self, err: &DbError) -> bool {
        matches!(err.code, Some(ER_NET_PACKET_TOO_LARGE) | Some(ER_PS_MANY_PARAM))
    }

    fn max_parameters(&self) -> Option<usize> {
        Some(MAX_PLACEHOLDERS)
    }
}

/// Text of a metadata cell; the text protocol may hand back raw bytes.
fn value_text(value: &SqlValue) -> Option<String> {
    match value {
        SqlValue::Text(s) => Some(s.clone()),
        SqlValue::Bytes(b) => String::from_utf8(b.clone()).ok(),
        _ => None,
    }
}
