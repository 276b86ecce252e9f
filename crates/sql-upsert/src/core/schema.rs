//! Target table column metadata.

use serde::{Deserialize, Serialize};

use super::value::RowSet;

/// One column of a target table, as reported by introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column name, lower-cased.
    pub name: String,

    /// Declared type as reported by the server (e.g. `int(11) unsigned`).
    pub data_type: String,
}

impl ColumnSpec {
    /// Create a column spec; the name is lower-cased.
    pub fn new(name: impl AsRef<str>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.as_ref().to_lowercase(),
            data_type: data_type.into(),
        }
    }
}

/// Ordered column list of one table.
///
/// Order is the table's ordinal order. A schema is fetched fresh for every
/// upsert and never cached, so drift between calls is picked up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name as given by the caller.
    pub table: String,

    /// Columns in ordinal order.
    pub columns: Vec<ColumnSpec>,
}

impl TableSchema {
    /// Create a schema from its columns.
    pub fn new(table: impl Into<String>, columns: Vec<ColumnSpec>) -> Self {
        Self {
            table: table.into(),
            columns,
        }
    }

    /// Column names in ordinal order.
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Check whether a column exists (case-insensitive).
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        let wanted = name.to_lowercase();
        self.columns.iter().any(|c| c.name == wanted)
    }

    /// Columns present both in this table and in `rows`, in table order.
    ///
    /// Incoming columns unknown to the table are dropped silently.
    #[must_use]
    pub fn intersect(&self, rows: &RowSet) -> Vec<ColumnSpec> {
        let incoming = rows.lowercase_columns();
        self.columns
            .iter()
            .filter(|c| incoming.contains(&c.name))
            .cloned()
            .collect()
    }
}
