//! Owned SQL values and the tabular row container.
//!
//! [`RowSet`] is the unit of data the upsert pipeline moves around: the rows
//! handed in by the caller, the rows streamed into a staging table chunk by
//! chunk, and the results returned by `read_sql`.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// SQL value enum for type-safe row handling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    /// SQL NULL.
    Null,

    /// Boolean value.
    Bool(bool),

    /// Signed integer of any width.
    I64(i64),

    /// Unsigned integer (MySQL `UNSIGNED` columns).
    U64(u64),

    /// Double precision float.
    F64(f64),

    /// Exact decimal value.
    Decimal(Decimal),

    /// Text/string data.
    Text(String),

    /// Binary data.
    Bytes(Vec<u8>),

    /// Date without time component.
    Date(NaiveDate),

    /// Time without date component.
    Time(NaiveTime),

    /// Timestamp without timezone.
    DateTime(NaiveDateTime),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Borrow the text payload, if this is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::I64(v as i64)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        SqlValue::U64(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl From<NaiveTime> for SqlValue {
    fn from(v: NaiveTime) -> Self {
        SqlValue::Time(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// One row of values, positionally aligned with [`RowSet::columns`].
pub type Row = Vec<SqlValue>;

/// Column-named tabular data.
///
/// Column names are kept as given; lookups through [`RowSet::column_index`]
/// and [`RowSet::select`] are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    /// Column names.
    pub columns: Vec<String>,

    /// Rows, each with exactly `columns.len()` values.
    pub rows: Vec<Row>,
}

impl RowSet {
    /// Create a row set from column names and rows.
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    /// Create a row set with columns and no rows.
    pub fn empty(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row.
    pub fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check whether the row set holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column, matched case-insensitively.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        let wanted = name.to_lowercase();
        self.columns.iter().position(|c| c.to_lowercase() == wanted)
    }

    /// Column names lower-cased, in order.
    #[must_use]
    pub fn lowercase_columns(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.to_lowercase()).collect()
    }

    /// Rename every column to its lower-cased form.
    #[must_use]
    pub fn with_lowercase_columns(mut self) -> Self {
        self.columns = self.lowercase_columns();
        self
    }

    /// Columnar slice: keep only `names`, in the given order.
    ///
    /// Names that do not exist in this row set are skipped. The returned
    /// columns carry the spelling passed in `names`.
    #[must_use]
    pub fn select(&self, names: &[String]) -> RowSet {
        let picked: Vec<(String, usize)> = names
            .iter()
            .filter_map(|n| self.column_index(n).map(|idx| (n.clone(), idx)))
            .collect();

        let rows = self
            .rows
            .iter()
            .map(|row| {
                picked
                    .iter()
                    .map(|(_, idx)| row.get(*idx).cloned().unwrap_or(SqlValue::Null))
                    .collect()
            })
            .collect();

        RowSet {
            columns: picked.into_iter().map(|(n, _)| n).collect(),
            rows,
        }
    }

    /// Borrow up to `len` rows starting at `offset`.
    #[must_use]
    pub fn chunk(&self, offset: usize, len: usize) -> &[Row] {
        let start = offset.min(self.rows.len());
        let end = offset.saturating_add(len).min(self.rows.len());
        &self.rows[start..end]
    }

    /// Value of a named column in the given row.
    #[must_use]
    pub fn get(&self, row: usize, column: &str) -> Option<&SqlValue> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }
}
