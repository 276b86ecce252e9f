//! Inputs and outputs of merge statement generation.
//!
//! The statement text itself is dialect specific and lives with each
//! dialect (see `MysqlDialect::build_merge`). This module holds the shared
//! pieces: the [`MergeSpec`] handed to the dialect, the resulting
//! [`MergeStatements`], and staging table storage options.

use tracing::warn;

use crate::core::schema::ColumnSpec;
use crate::error::{Result, UpsertError};

use super::request::{NullPolicy, UpsertMode, UpsertOptions};

/// Staging storage engine used when none (or an unsafe one) is requested.
pub const DEFAULT_ENGINE: &str = "InnoDB";

/// Staging character set used when none is requested.
pub const DEFAULT_CHARSET: &str = "utf8mb4";

/// Engines that keep rows in memory only.
const MEMORY_ENGINES: [&str; 2] = ["MEMORY", "HEAP"];

/// Everything a dialect needs to generate the statements of one upsert.
#[derive(Debug, Clone)]
pub struct MergeSpec<'a> {
    /// Staging table name (unquoted, optionally qualified).
    pub staging: &'a str,
    /// Target table name (unquoted, optionally qualified).
    pub target: &'a str,
    /// Shared columns in target order, with their declared types.
    pub columns: &'a [ColumnSpec],
    pub mode: UpsertMode,
    pub null_policy: NullPolicy,
    /// Create the staging table as `TEMPORARY`.
    pub temporary: bool,
    pub engine: Option<&'a str>,
    pub charset: Option<&'a str>,
    pub reset_auto_increment: bool,
}

impl<'a> MergeSpec<'a> {
    /// Build a spec from the per-call options.
    pub fn new(
        staging: &'a str,
        target: &'a str,
        columns: &'a [ColumnSpec],
        options: &'a UpsertOptions,
    ) -> Self {
        Self {
            staging,
            target,
            columns,
            mode: options.mode,
            null_policy: options.null_policy,
            temporary: options.effective_temporary(),
            engine: options.engine.as_deref(),
            charset: options.charset.as_deref(),
            reset_auto_increment: options.reset_auto_increment,
        }
    }

    /// `TABLE` or `TEMPORARY TABLE`.
    pub fn table_kind(&self) -> &'static str {
        if self.temporary {
            "TEMPORARY TABLE"
        } else {
            "TABLE"
        }
    }
}

/// Generated statements, executed in the order drop, create, load, merge,
/// then the optional auto-increment reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeStatements {
    /// Idempotent `DROP ... IF EXISTS` of the staging table. Used both as the
    /// pre-clean and as the final cleanup.
    pub drop: String,
    /// `CREATE` of the staging table.
    pub create: String,
    /// Set-based merge from staging into the target.
    pub merge: String,
    /// `ALTER TABLE ... AUTO_INCREMENT = 1`, when requested.
    pub reset_auto_increment: Option<String>,
}

/// Resolve the staging storage engine.
///
/// Memory-resident engines are only allowed for true temporary tables;
/// otherwise they are replaced by [`DEFAULT_ENGINE`].
pub fn resolve_engine(hint: Option<&str>, temporary: bool) -> Result<String> {
    let Some(engine) = hint.map(str::trim).filter(|e| !e.is_empty()) else {
        return Ok(DEFAULT_ENGINE.to_string());
    };
    validate_option_word("engine", engine)?;

    let upper = engine.to_uppercase();
    if !temporary && MEMORY_ENGINES.contains(&upper.as_str()) {
        warn!(
            "Staging engine {} is memory-resident; using {} for a non-temporary staging table",
            engine, DEFAULT_ENGINE
        );
        return Ok(DEFAULT_ENGINE.to_string());
    }

    Ok(engine.to_string())
}

/// Resolve the staging character set.
pub fn resolve_charset(hint: Option<&str>) -> Result<String> {
    match hint.map(str::trim).filter(|c| !c.is_empty()) {
        Some(charset) => {
            validate_option_word("charset", charset)?;
            Ok(charset.to_string())
        }
        None => Ok(DEFAULT_CHARSET.to_string()),
    }
}

/// Table options are spliced into DDL unquoted, so only plain words pass.
fn validate_option_word(what: &str, value: &str) -> Result<()> {
    if value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(UpsertError::Config(format!(
            "Invalid staging {} '{}': only letters, digits and '_' are allowed",
            what, value
        )))
    }
}
