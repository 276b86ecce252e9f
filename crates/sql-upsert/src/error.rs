//! Error types for the upsert library.

use thiserror::Error;

/// A failure reported by a database connection.
///
/// Drivers normalise their native errors into this shape so that the
/// dialect can classify them by numeric code (see
/// [`Dialect::is_payload_too_large`](crate::core::Dialect::is_payload_too_large)).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbError {
    /// Vendor error code, when the server supplied one.
    pub code: Option<u32>,
    /// Human readable message.
    pub message: String,
}

impl DbError {
    /// Create an error carrying a vendor error code.
    pub fn with_code(code: u32, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }

    /// Create an error without a vendor code (client-side or I/O failures).
    pub fn other(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "[{}] {}", code, self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for DbError {}

/// Result type for raw connection operations.
pub type DbResult<T> = std::result::Result<T, DbError>;

/// Main error type for upsert operations.
#[derive(Error, Debug)]
pub enum UpsertError {
    /// Invalid mode, null policy, identifier or configuration value.
    /// Raised before any SQL is executed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Target table introspection failed (missing table, connectivity).
    #[error("Schema introspection failed for table {table}: {message}")]
    Schema { table: String, message: String },

    /// Loading rows into the staging table failed. When the underlying error
    /// is a transport-size failure this is raised only after the chunk size
    /// could not be halved any further.
    #[error("Loading staging table {table} failed at chunk size {chunk_size}: {source}")]
    LoadFailed {
        table: String,
        chunk_size: usize,
        #[source]
        source: DbError,
    },

    /// A DROP/CREATE/merge/ALTER statement failed.
    #[error("Merge into {table} failed during {step}: {source}")]
    MergeExecution {
        table: String,
        step: &'static str,
        #[source]
        source: DbError,
    },

    /// Dropping the staging table failed. Only ever logged.
    #[error("Cleanup of staging table {table} failed: {source}")]
    Cleanup {
        table: String,
        #[source]
        source: DbError,
    },

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Statement failed outside of an upsert (reads, truncate, ad hoc SQL).
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// A scheduled upsert task died before reporting.
    #[error("Upsert task for table {table} failed: {message}")]
    TaskFailed { table: String, message: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl UpsertError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        UpsertError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Schema error for a table.
    pub fn schema(table: impl Into<String>, message: impl Into<String>) -> Self {
        UpsertError::Schema {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a MergeExecution error for the named step.
    pub fn merge(table: impl Into<String>, step: &'static str, source: DbError) -> Self {
        UpsertError::MergeExecution {
            table: table.into(),
            step,
            source,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for upsert operations.
pub type Result<T> = std::result::Result<T, UpsertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_error_display() {
        assert_eq!(
            DbError::with_code(1153, "packet too large").to_string(),
            "[1153] packet too large"
        );
        assert_eq!(DbError::other("broken pipe").to_string(), "broken pipe");
    }

    #[test]
    fn test_format_detailed_includes_source() {
        let err = UpsertError::LoadFailed {
            table: "t_stage".into(),
            chunk_size: 1,
            source: DbError::with_code(1153, "packet too large"),
        };
        let detailed = err.format_detailed();
        assert!(detailed.contains("t_stage"));
        assert!(detailed.contains("Caused by:"));
        assert!(detailed.contains("[1153] packet too large"));
    }
}
