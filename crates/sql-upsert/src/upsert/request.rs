//! Upsert request options.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::value::RowSet;
use crate::error::UpsertError;

/// How conflicting rows are resolved during the merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum UpsertMode {
    /// Update existing rows column by column (see [`NullPolicy`]).
    #[default]
    Update,
    /// Keep existing rows, drop conflicting incoming rows.
    Ignore,
    /// Replace conflicting rows entirely (delete + insert).
    Replace,
}

impl UpsertMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpsertMode::Update => "update",
            UpsertMode::Ignore => "ignore",
            UpsertMode::Replace => "replace",
        }
    }
}

impl FromStr for UpsertMode {
    type Err = UpsertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "update" => Ok(UpsertMode::Update),
            "ignore" => Ok(UpsertMode::Ignore),
            "replace" => Ok(UpsertMode::Replace),
            other => Err(UpsertError::Config(format!(
                "Unknown upsert mode '{}' (expected update, ignore or replace)",
                other
            ))),
        }
    }
}

impl TryFrom<String> for UpsertMode {
    type Error = UpsertError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<UpsertMode> for String {
    fn from(mode: UpsertMode) -> Self {
        mode.as_str().to_string()
    }
}

impl fmt::Display for UpsertMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side wins when an `update` merge meets NULLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NullPolicy {
    /// Always take the incoming value, NULL included.
    Force,
    /// Incoming value unless it is NULL, then keep the existing one.
    #[default]
    New,
    /// Existing value unless it is NULL, then take the incoming one.
    Old,
}

impl NullPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            NullPolicy::Force => "force",
            NullPolicy::New => "new",
            NullPolicy::Old => "old",
        }
    }
}

impl FromStr for NullPolicy {
    type Err = UpsertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "force" => Ok(NullPolicy::Force),
            "new" => Ok(NullPolicy::New),
            "old" => Ok(NullPolicy::Old),
            other => Err(UpsertError::Config(format!(
                "Unknown null policy '{}' (expected force, new or old)",
                other
            ))),
        }
    }
}

impl TryFrom<String> for NullPolicy {
    type Error = UpsertError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NullPolicy> for String {
    fn from(policy: NullPolicy) -> Self {
        policy.as_str().to_string()
    }
}

impl fmt::Display for NullPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-call upsert options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertOptions {
    /// Conflict resolution mode.
    #[serde(default)]
    pub mode: UpsertMode,

    /// NULL tie-break for `update` mode. Ignored by the other modes.
    #[serde(default)]
    pub null_policy: NullPolicy,

    /// Fixed staging suffix; the caller guarantees uniqueness.
    /// Whitespace is stripped and an empty value counts as absent.
    #[serde(default)]
    pub staging_postfix: Option<String>,

    /// Leave the staging table in place after the upsert.
    #[serde(default)]
    pub keep_staging: bool,

    /// Stage into a session-scoped `TEMPORARY` table.
    #[serde(default)]
    pub use_temporary_table: bool,

    /// Run `ALTER TABLE ... AUTO_INCREMENT = 1` after the merge.
    #[serde(default)]
    pub reset_auto_increment: bool,

    /// Storage engine of the staging table (defaults to InnoDB).
    #[serde(default)]
    pub engine: Option<String>,

    /// Character set of the staging table (defaults to utf8mb4).
    #[serde(default)]
    pub charset: Option<String>,

    /// Rows per load batch. `None` sends everything at once.
    #[serde(default)]
    pub chunk_size: Option<usize>,
}

impl UpsertOptions {
    pub fn with_mode(mut self, mode: UpsertMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_null_policy(mut self, policy: NullPolicy) -> Self {
        self.null_policy = policy;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    pub fn with_staging_postfix(mut self, postfix: impl Into<String>) -> Self {
        self.staging_postfix = Some(postfix.into());
        self
    }

    pub fn keep_staging(mut self, keep: bool) -> Self {
        self.keep_staging = keep;
        self
    }

    /// Whether the staging table is really created `TEMPORARY`.
    ///
    /// A kept staging table must outlive the session, so `keep_staging`
    /// wins over `use_temporary_table`.
    #[must_use]
    pub fn effective_temporary(&self) -> bool {
        self.use_temporary_table && !self.keep_staging
    }
}

/// One table's worth of upsert work.
#[derive(Debug, Clone)]
pub struct UpsertRequest {
    /// Target table, optionally `db.table`.
    pub table: String,

    /// Incoming rows.
    pub rows: RowSet,

    /// Options for this table.
    pub options: UpsertOptions,
}

impl UpsertRequest {
    pub fn new(table: impl Into<String>, rows: RowSet, options: UpsertOptions) -> Self {
        Self {
            table: table.into(),
            rows,
            options,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse_is_case_insensitive() {
        assert_eq!("UPDATE".parse::<UpsertMode>().unwrap(), UpsertMode::Update);
        assert_eq!(" Ignore ".parse::<UpsertMode>().unwrap(), UpsertMode::Ignore);
        assert_eq!("replace".parse::<UpsertMode>().unwrap(), UpsertMode::Replace);
    }

    #[test]
    fn test_unknown_mode_is_config_error() {
        let err = "merge".parse::<UpsertMode>().unwrap_err();
        assert!(matches!(err, UpsertError::Config(_)));
        assert!(err.to_string().contains("merge"));
    }

    #[test]
    fn test_null_policy_parse() {
        assert_eq!("Force".parse::<NullPolicy>().unwrap(), NullPolicy::Force);
        assert_eq!("old".parse::<NullPolicy>().unwrap(), NullPolicy::Old);
        assert!(matches!(
            "latest".parse::<NullPolicy>(),
            Err(UpsertError::Config(_))
        ));
    }

    #[test]
    fn test_defaults() {
        let opts = UpsertOptions::default();
        assert_eq!(opts.mode, UpsertMode::Update);
        assert_eq!(opts.null_policy, NullPolicy::New);
        assert!(opts.chunk_size.is_none());
        assert!(!opts.keep_staging);
    }

    #[test]
    fn test_keep_staging_beats_temporary() {
        let mut opts = UpsertOptions {
            use_temporary_table: true,
            ..Default::default()
        };
        assert!(opts.effective_temporary());
        opts.keep_staging = true;
        assert!(!opts.effective_temporary());
    }

    #[test]
    fn test_options_deserialize() {
        let yaml = "mode: Replace\nnull_policy: OLD\nchunk_size: 500\n";
        let opts: UpsertOptions = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(opts.mode, UpsertMode::Replace);
        assert_eq!(opts.null_policy, NullPolicy::Old);
        assert_eq!(opts.chunk_size, Some(500));

        assert!(serde_yaml::from_str::<UpsertOptions>("mode: upsert\n").is_err());
    }
}
