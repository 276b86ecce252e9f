//! Adaptive chunked loading into a staging table.

use tracing::{debug, warn};

use crate::core::traits::{Connection, Dialect};
use crate::core::value::RowSet;
use crate::error::{DbError, Result, UpsertError};

/// Streams rows into a staging table in batches.
///
/// Starts with the requested batch size (all rows when unset), capped so a
/// batch fits the dialect's bind-parameter limit. Each batch is sent as one
/// statement, so a rejected batch writes nothing. When the dialect
/// classifies a failure as "payload too large", the batch size is halved and
/// the rows that were not yet written are sent again. The load gives up with
/// [`UpsertError::LoadFailed`] once the size would drop below one row. Any
/// other failure ends the load at once.
///
/// MySQL may close the connection after an oversized packet, so the retry
/// can fail with a bare network error. That failure is reported with the
/// size error's code and both messages.
pub struct ChunkedLoader<'a> {
    dialect: &'a dyn Dialect,
}

impl<'a> ChunkedLoader<'a> {
    pub fn new(dialect: &'a dyn Dialect) -> Self {
        Self { dialect }
    }

    /// Load every row of `rows` into `staging`, returning the rows written.
    pub async fn load(
        &self,
        conn: &mut dyn Connection,
        staging: &str,
        rows: &RowSet,
        initial_chunk_size: Option<usize>,
    ) -> Result<u64> {
        let total = rows.len();
        if total == 0 {
            return Ok(0);
        }

        let mut chunk_size = match initial_chunk_size {
            Some(0) => {
                return Err(UpsertError::Config(
                    "chunk_size must be at least 1".to_string(),
                ))
            }
            Some(n) => n.min(total),
            None => total,
        };
        if let Some(max_rows) = self.max_rows_per_batch(rows.columns.len()) {
            if chunk_size > max_rows {
                debug!(
                    "Capping batches into {} at {} rows ({} columns)",
                    staging,
                    max_rows,
                    rows.columns.len()
                );
                chunk_size = max_rows;
            }
        }

        let mut offset = 0;
        let mut written = 0u64;
        let mut size_error: Option<DbError> = None;
        while offset < total {
            let batch = rows.chunk(offset, chunk_size);
            match conn.bulk_insert(staging, &rows.columns, batch).await {
                Ok(n) => {
                    debug!(
                        "Loaded {} rows into {} ({}/{})",
                        batch.len(),
                        staging,
                        offset + batch.len(),
                        total
                    );
                    offset += batch.len();
                    written += n;
                    size_error = None;
                }
                Err(e) if self.dialect.is_payload_too_large(&e) => {
                    let halved = chunk_size / 2;
                    if halved < 1 {
                        return Err(UpsertError::LoadFailed {
                            table: staging.to_string(),
                            chunk_size,
                            source: e,
                        });
                    }
                    warn!(
                        "Load into {} too large at {} rows ({}); retrying with {}",
                        staging, chunk_size, e, halved
                    );
                    chunk_size = halved;
                    size_error = Some(e);
                }
                Err(e) => {
                    let source = match size_error {
                        Some(size) if e.code.is_none() => DbError {
                            code: size.code,
                            message: format!("{} (after: {})", e.message, size.message),
                        },
                        _ => e,
                    };
                    return Err(UpsertError::LoadFailed {
                        table: staging.to_string(),
                        chunk_size,
                        source,
                    });
                }
            }
        }

        Ok(written)
    }

    fn max_rows_per_batch(&self, columns: usize) -> Option<usize> {
        let max = self.dialect.max_parameters()?;
        Some((max / columns.max(1)).max(1))
    }
}
