//! Identifier validation and quoting.
//!
//! Table and column names cannot be bound as statement parameters, so every
//! name that ends up in generated SQL passes through here: it is validated,
//! split on the `db.table` separator where relevant, and quoted with the
//! dialect's delimiter (inner delimiters doubled).

use crate::error::{Result, UpsertError};

/// Longest identifier accepted by MySQL, and the staging-name ceiling.
pub const MAX_IDENTIFIER_LENGTH: usize = 64;

/// Validate a single identifier part.
///
/// Rejects empty names, names containing null bytes and names longer than
/// [`MAX_IDENTIFIER_LENGTH`] characters.
///
/// # Errors
///
/// Returns `UpsertError::Config` describing the problem.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(UpsertError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(UpsertError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    let len = name.chars().count();
    if len > MAX_IDENTIFIER_LENGTH {
        return Err(UpsertError::Config(format!(
            "Identifier exceeds maximum length of {} characters (got {}): {:?}",
            MAX_IDENTIFIER_LENGTH, len, name
        )));
    }

    Ok(())
}

/// Split `db.table` into its parts. A name without a dot has no qualifier.
///
/// Only the first dot separates; the rest stays in the table part.
pub fn split_qualified(name: &str) -> (Option<&str>, &str) {
    match name.split_once('.') {
        Some((qualifier, table)) if !qualifier.is_empty() => (Some(qualifier), table),
        _ => (None, name),
    }
}

/// Quote a MySQL identifier using backticks.
///
/// ```ignore
/// assert_eq!(quote_mysql("users")?, "`users`");
/// assert_eq!(quote_mysql("table`name")?, "`table``name`");
/// ```
pub fn quote_mysql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("`{}`", name.replace('`', "``")))
}

/// Quote a SQL Server identifier using brackets.
pub fn quote_mssql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("[{}]", name.replace(']', "]]")))
}

/// Quote a possibly qualified MySQL table name (`db.table`).
pub fn qualify_mysql(name: &str) -> Result<String> {
    match split_qualified(name) {
        (Some(db), table) => Ok(format!("{}.{}", quote_mysql(db)?, quote_mysql(table)?)),
        (None, table) => quote_mysql(table),
    }
}

/// Quote a possibly qualified SQL Server table name (`schema.table`).
pub fn qualify_mssql(name: &str) -> Result<String> {
    match split_qualified(name) {
        (Some(schema), table) => Ok(format!("{}.{}", quote_mssql(schema)?, quote_mssql(table)?)),
        (None, table) => quote_mssql(table),
    }
}

/// Escape a value for use inside a single-quoted SQL string literal.
pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}
