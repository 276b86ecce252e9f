//! High-level client tying an engine, a dialect and the upsert pipeline.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::Config;
use crate::core::schema::TableSchema;
use crate::core::temporal::coerce_temporal_columns;
use crate::core::traits::{Dialect, Engine};
use crate::core::value::RowSet;
use crate::drivers::{connect_engine, DialectImpl};
use crate::error::Result;
use crate::orchestrator::{ConcurrentUpsertScheduler, UpsertReport};
use crate::upsert::{
    SchemaIntrospector, UpsertCoordinator, UpsertOptions, UpsertRequest, UpsertSummary,
};

/// Entry point for upserts and the small set of read/maintenance helpers
/// that go with them.
///
/// ```rust,no_run
/// use sql_upsert::{Config, RowSet, SqlValue, UpsertClient};
///
/// # async fn run() -> sql_upsert::Result<()> {
/// let config = Config::load("upsert.yaml")?;
/// let client = UpsertClient::from_config(&config).await?;
///
/// let rows = RowSet::new(
///     vec!["id".into(), "close".into()],
///     vec![vec![SqlValue::I64(1), SqlValue::F64(10.5)]],
/// );
/// let summary = client.upsert("quotes", rows, client.defaults()).await?;
/// println!("{} rows loaded", summary.rows_loaded);
/// # Ok(())
/// # }
/// ```
pub struct UpsertClient {
    coordinator: Arc<UpsertCoordinator>,
    scheduler: ConcurrentUpsertScheduler,
    defaults: UpsertOptions,
    max_workers: usize,
}

impl UpsertClient {
    /// Build a client over an existing engine.
    pub fn new(engine: Arc<dyn Engine>, dialect: DialectImpl) -> Self {
        let coordinator = Arc::new(UpsertCoordinator::new(engine, dialect));
        Self {
            scheduler: ConcurrentUpsertScheduler::new(coordinator.clone()),
            coordinator,
            defaults: UpsertOptions::default(),
            max_workers: 8,
        }
    }

    /// Connect to the configured target and adopt its upsert defaults.
    pub async fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let dialect = config.dialect()?;
        let engine = connect_engine(&config.target, config.scheduler.max_connections).await?;
        Ok(Self::new(engine, dialect)
            .with_defaults(config.upsert.clone())
            .with_max_workers(config.scheduler.max_workers))
    }

    pub fn with_defaults(mut self, options: UpsertOptions) -> Self {
        self.defaults = options;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// Options used when the caller has no per-call overrides.
    pub fn defaults(&self) -> &UpsertOptions {
        &self.defaults
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn dialect(&self) -> &DialectImpl {
        self.coordinator.dialect()
    }

    /// Upsert `rows` into `table`.
    pub async fn upsert(
        &self,
        table: &str,
        rows: RowSet,
        options: &UpsertOptions,
    ) -> Result<UpsertSummary> {
        let request = UpsertRequest::new(table, rows, options.clone());
        self.coordinator.upsert(&request).await
    }

    /// Upsert several tables concurrently. See
    /// [`ConcurrentUpsertScheduler::upsert_many`].
    pub async fn upsert_many<I>(
        &self,
        tables: I,
        max_workers: Option<usize>,
        options: &UpsertOptions,
        cancel: &CancellationToken,
    ) -> UpsertReport
    where
        I: IntoIterator<Item = (String, RowSet)>,
    {
        let workers = max_workers.unwrap_or(self.max_workers);
        self.scheduler
            .upsert_many(tables, options, workers, cancel)
            .await
    }

    /// Run a query. Column names are lower-cased and `_date`/`_time`
    /// columns are coerced to timestamps.
    pub async fn read_sql(&self, sql: &str) -> Result<RowSet> {
        let mut conn = self.coordinator.engine().connect().await?;
        debug!("read_sql: {}", sql);
        let rows = conn.query(sql).await?;
        Ok(coerce_temporal_columns(rows.with_lowercase_columns()))
    }

    /// Execute a statement, returning the affected row count.
    pub async fn execute(&self, sql: &str) -> Result<u64> {
        let mut conn = self.coordinator.engine().connect().await?;
        debug!("execute: {}", sql);
        Ok(conn.execute(sql).await?)
    }

    /// Empty a table.
    pub async fn truncate(&self, table: &str) -> Result<u64> {
        let sql = self.dialect().truncate_sql(table)?;
        self.execute(&sql).await
    }

    /// Column listing of a table.
    pub async fn table_columns(&self, table: &str) -> Result<TableSchema> {
        let mut conn = self.coordinator.engine().connect().await?;
        SchemaIntrospector::new(self.dialect())
            .columns(conn.as_mut(), table)
            .await
    }

    /// Read `fields` of `table`, optionally filtered.
    ///
    /// Entries of `fields` may be comma-separated lists. Fields the table
    /// does not have are skipped; if none remain every column is read.
    pub async fn table_data(
        &self,
        table: &str,
        fields: &[&str],
        filter: Option<&str>,
    ) -> Result<RowSet> {
        let schema = self.table_columns(table).await?;
        let wanted = existing_fields(&schema, fields);
        let sql = self.dialect().select_sql(table, &wanted, filter)?;
        self.read_sql(&sql).await
    }
}

/// Requested fields that exist in `schema`, lower-cased, in request order.
fn existing_fields(schema: &TableSchema, fields: &[&str]) -> Vec<String> {
    let mut wanted: Vec<String> = Vec::new();
    for field in fields.iter().flat_map(|f| f.split(',')) {
        let field = field.trim().to_lowercase();
        if !field.is_empty() && schema.contains(&field) && !wanted.contains(&field) {
            wanted.push(field);
        }
    }
    wanted
}
