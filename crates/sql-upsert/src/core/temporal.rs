//! Post-read coercion of date/time-named columns.
//!
//! Columns whose lower-cased name ends in `_date` or `_time` are turned into
//! timestamps after a read. Values that cannot be interpreted become NULL.

use chrono::{NaiveDate, NaiveDateTime};

use super::value::{RowSet, SqlValue};

const TEMPORAL_SUFFIXES: [&str; 2] = ["_date", "_time"];

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];

/// Whether a column name marks a temporal column.
pub fn is_temporal_column(name: &str) -> bool {
    let lower = name.to_lowercase();
    TEMPORAL_SUFFIXES.iter().any(|s| lower.ends_with(s))
}

/// Coerce every temporal column of `rows` in place and return it.
pub fn coerce_temporal_columns(mut rows: RowSet) -> RowSet {
    let targets: Vec<usize> = rows
        .columns
        .iter()
        .enumerate()
        .filter(|(_, name)| is_temporal_column(name))
        .map(|(idx, _)| idx)
        .collect();

    if targets.is_empty() {
        return rows;
    }

    for row in &mut rows.rows {
        for &idx in &targets {
            if let Some(value) = row.get_mut(idx) {
                let coerced = coerce_value(std::mem::replace(value, SqlValue::Null));
                *value = coerced;
            }
        }
    }

    rows
}

fn coerce_value(value: SqlValue) -> SqlValue {
    match value {
        SqlValue::DateTime(_) | SqlValue::Time(_) | SqlValue::Null => value,
        SqlValue::Date(d) => d.and_hms_opt(0, 0, 0).map_or(SqlValue::Null, SqlValue::DateTime),
        SqlValue::Text(s) => parse_datetime(&s).map_or(SqlValue::Null, SqlValue::DateTime),
        SqlValue::Bytes(b) => std::str::from_utf8(&b)
            .ok()
            .and_then(parse_datetime)
            .map_or(SqlValue::Null, SqlValue::DateTime),
        _ => SqlValue::Null,
    }
}

/// Parse a timestamp or bare date. A bare date maps to midnight.
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
