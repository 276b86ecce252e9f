//! Single-table upsert: introspect, stage, load, merge, clean up.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::traits::{Connection, Dialect, Engine};
use crate::core::value::RowSet;
use crate::drivers::DialectImpl;
use crate::error::{Result, UpsertError};

use super::introspect::SchemaIntrospector;
use super::loader::ChunkedLoader;
use super::merge::{MergeSpec, MergeStatements};
use super::request::{UpsertOptions, UpsertRequest};
use super::staging::StagingNameAllocator;

/// Result of one successful table upsert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertSummary {
    /// Target table.
    pub table: String,
    /// Staging table used, `None` when there was nothing to do.
    pub staging: Option<String>,
    /// Columns written, in target order.
    pub columns: Vec<String>,
    /// Incoming columns the target does not have.
    pub dropped_columns: Vec<String>,
    /// Rows loaded into staging.
    pub rows_loaded: u64,
    /// Rows affected by the merge statement, as reported by the server.
    pub rows_affected: u64,
    /// The merge committed but resetting the target's auto-increment
    /// counter failed.
    #[serde(default)]
    pub auto_increment_reset_failed: bool,
    /// Whether the staging table was left in place.
    pub kept_staging: bool,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

struct Merged {
    rows_loaded: u64,
    rows_affected: u64,
    auto_increment_reset_failed: bool,
}

impl UpsertSummary {
    fn noop(table: &str) -> Self {
        Self {
            table: table.to_string(),
            ..Default::default()
        }
    }
}

/// Runs one upsert as a single unit of work on one connection.
///
/// Statement order is pre-clean DROP and CREATE of the staging table, then
/// load and merge inside a transaction, then the optional auto-increment
/// reset. A failed load or merge is rolled back. The staging table is then
/// dropped whatever happened, unless `keep_staging` is set. A failed final
/// drop is logged and never replaces the upsert's own result.
pub struct UpsertCoordinator {
    engine: Arc<dyn Engine>,
    dialect: DialectImpl,
    names: StagingNameAllocator,
}

impl UpsertCoordinator {
    pub fn new(engine: Arc<dyn Engine>, dialect: DialectImpl) -> Self {
        Self {
            engine,
            dialect,
            names: StagingNameAllocator::new(),
        }
    }

    /// The engine connections are drawn from.
    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    pub fn dialect(&self) -> &DialectImpl {
        &self.dialect
    }

    /// Upsert one table.
    pub async fn upsert(&self, request: &UpsertRequest) -> Result<UpsertSummary> {
        let table = request.table.as_str();
        let options = &request.options;

        if request.rows.is_empty() {
            debug!("{}: no rows, nothing to upsert", table);
            return Ok(UpsertSummary::noop(table));
        }

        if !self.dialect.supports_merge() {
            return Err(UpsertError::Config(format!(
                "{}: staging upserts are not supported for {} targets",
                table,
                self.dialect.name()
            )));
        }

        if options.keep_staging && options.use_temporary_table {
            warn!(
                "{}: keep_staging is set, staging into a regular table instead of a temporary one",
                table
            );
        }

        let started = Instant::now();
        let staging = self
            .names
            .allocate(table, options.staging_postfix.as_deref())?;

        let mut conn = self.engine.connect().await?;

        let schema = SchemaIntrospector::new(&self.dialect)
            .columns(conn.as_mut(), table)
            .await?;
        let columns = schema.intersect(&request.rows);
        if columns.is_empty() {
            return Err(UpsertError::schema(
                table,
                format!(
                    "none of the incoming columns [{}] exist in the table",
                    request.rows.columns.join(", ")
                ),
            ));
        }

        let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        let dropped_columns: Vec<String> = request
            .rows
            .lowercase_columns()
            .into_iter()
            .filter(|c| !schema.contains(c))
            .collect();
        if !dropped_columns.is_empty() {
            debug!(
                "{}: ignoring columns not in table: {}",
                table,
                dropped_columns.join(", ")
            );
        }

        let spec = MergeSpec::new(&staging, table, &columns, options);
        let statements = self.dialect.build_merge(&spec)?;
        let rows = request.rows.select(&names);

        let outcome = self
            .stage_and_merge(conn.as_mut(), table, &staging, &statements, &rows, options)
            .await;

        if options.keep_staging {
            info!("{}: keeping staging table {}", table, staging);
        } else {
            self.cleanup(conn.as_mut(), &staging, &statements).await;
        }

        let merged = outcome?;
        let summary = UpsertSummary {
            table: table.to_string(),
            staging: Some(staging),
            columns: names,
            dropped_columns,
            rows_loaded: merged.rows_loaded,
            rows_affected: merged.rows_affected,
            auto_increment_reset_failed: merged.auto_increment_reset_failed,
            kept_staging: options.keep_staging,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            "{}: upserted {} rows ({} affected, mode={}) in {}ms",
            table, summary.rows_loaded, summary.rows_affected, options.mode, summary.duration_ms
        );
        Ok(summary)
    }

    /// DROP and CREATE the staging table, then load and merge inside a
    /// transaction. Rolls back if the load or merge fails.
    ///
    /// The DDL runs before `BEGIN` because MySQL commits implicitly on DDL.
    /// The auto-increment reset runs after `COMMIT` for the same reason, and
    /// its failure is logged without failing the upsert.
    async fn stage_and_merge(
        &self,
        conn: &mut dyn Connection,
        table: &str,
        staging: &str,
        statements: &MergeStatements,
        rows: &RowSet,
        options: &UpsertOptions,
    ) -> Result<Merged> {
        execute_step(conn, table, "drop staging", &statements.drop).await?;
        execute_step(conn, table, "create staging", &statements.create).await?;

        conn.begin()
            .await
            .map_err(|e| UpsertError::merge(table, "begin", e))?;

        let result = self.load_and_merge(conn, table, staging, statements, rows, options).await;
        let (rows_loaded, rows_affected) = match result {
            Ok(counts) => counts,
            Err(e) => {
                warn!("{}: upsert failed, rolling back: {}", table, e);
                if let Err(rollback_err) = conn.rollback().await {
                    warn!("{}: rollback failed: {}", table, rollback_err);
                }
                return Err(e);
            }
        };

        let mut auto_increment_reset_failed = false;
        if let Some(reset) = &statements.reset_auto_increment {
            if let Err(e) = execute_step(conn, table, "reset auto_increment", reset).await {
                warn!("{}: merged, but {}", table, e);
                auto_increment_reset_failed = true;
            }
        }

        Ok(Merged {
            rows_loaded,
            rows_affected,
            auto_increment_reset_failed,
        })
    }

    async fn load_and_merge(
        &self,
        conn: &mut dyn Connection,
        table: &str,
        staging: &str,
        statements: &MergeStatements,
        rows: &RowSet,
        options: &UpsertOptions,
    ) -> Result<(u64, u64)> {
        let loaded = ChunkedLoader::new(&self.dialect)
            .load(conn, staging, rows, options.chunk_size)
            .await?;

        let affected = execute_step(conn, table, "merge", &statements.merge).await?;

        conn.commit()
            .await
            .map_err(|e| UpsertError::merge(table, "commit", e))?;

        Ok((loaded, affected))
    }

    async fn cleanup(&self, conn: &mut dyn Connection, staging: &str, statements: &MergeStatements) {
        debug!("Cleanup: {}", statements.drop);
        if let Err(source) = conn.execute(&statements.drop).await {
            let err = UpsertError::Cleanup {
                table: staging.to_string(),
                source,
            };
            warn!("{}", err);
        }
    }
}

async fn execute_step(
    conn: &mut dyn Connection,
    table: &str,
    step: &'static str,
    sql: &str,
) -> Result<u64> {
    debug!("{} ({}): {}", table, step, sql);
    conn.execute(sql)
        .await
        .map_err(|e| UpsertError::merge(table, step, e))
}
