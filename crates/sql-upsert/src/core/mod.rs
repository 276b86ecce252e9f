//! Core abstractions shared by the drivers and the upsert pipeline.
//!
//! - [`schema`]: target table column metadata
//! - [`value`]: owned SQL values and the [`RowSet`] container
//! - [`traits`]: engine, connection and dialect seams
//! - [`identifier`]: identifier validation and quoting
//! - [`temporal`]: post-read coercion of date/time-named columns

pub mod identifier;
pub mod schema;
pub mod temporal;
pub mod traits;
pub mod value;

pub use schema::{ColumnSpec, TableSchema};
pub use temporal::coerce_temporal_columns;
pub use traits::{Connection, Dialect, Engine};
pub use value::{Row, RowSet, SqlValue};
