//! SQL Server engine over `tiberius`, pooled with `bb8`.

use std::time::Duration;

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel, FromSql, Query};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};

use crate::config::TargetConfig;
use crate::core::identifier::{qualify_mssql, quote_mssql};
use crate::core::traits::{Connection, Engine};
use crate::core::value::{Row, RowSet, SqlValue};
use crate::error::{DbError, DbResult, Result, UpsertError};

use super::dialect::{ER_TOO_MANY_PARAMETERS, MAX_PARAMETERS};

/// Connection acquisition timeout from pool (30 seconds).
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection manager for bb8 pool with Tiberius.
#[derive(Clone)]
pub struct TiberiusConnectionManager {
    config: TargetConfig,
}

impl TiberiusConnectionManager {
    fn new(config: TargetConfig) -> Self {
        Self { config }
    }

    fn build_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.config.host);
        config.port(self.config.port);
        config.database(&self.config.database);
        config.authentication(AuthMethod::sql_server(
            &self.config.user,
            &self.config.password,
        ));

        if self.config.ssl_mode.eq_ignore_ascii_case("disable") {
            config.encryption(EncryptionLevel::NotSupported);
        } else {
            if self.config.trust_server_cert {
                config.trust_cert();
            }
            config.encryption(EncryptionLevel::Required);
        }

        config
    }
}

#[async_trait]
impl bb8::ManageConnection for TiberiusConnectionManager {
    type Connection = Client<Compat<TcpStream>>;
    type Error = tiberius::error::Error;

    async fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        let config = self.build_config();
        let tcp = TcpStream::connect(config.get_addr()).await.map_err(|e| {
            tiberius::error::Error::Io {
                kind: e.kind(),
                message: e.to_string(),
            }
        })?;
        tcp.set_nodelay(true).ok();
        Client::connect(config, tcp.compat_write()).await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        conn.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// Pooled SQL Server engine.
pub struct MssqlEngine {
    pool: Pool<TiberiusConnectionManager>,
    max_connections: usize,
}

impl MssqlEngine {
    /// Create the pool from configuration and verify one connection.
    pub async fn new(config: &TargetConfig, max_connections: usize) -> Result<Self> {
        let max_connections = max_connections.max(1);
        let manager = TiberiusConnectionManager::new(config.clone());
        let pool = Pool::builder()
            .max_size(max_connections as u32)
            .connection_timeout(POOL_CONNECTION_TIMEOUT)
            .test_on_check_out(true)
            .build(manager)
            .await
            .map_err(|e| UpsertError::pool(e, "creating MSSQL connection pool"))?;

        {
            let mut conn = pool
                .get()
                .await
                .map_err(|e| UpsertError::pool(e, "testing MSSQL connection"))?;
            conn.simple_query("SELECT 1")
                .await
                .map_err(|e| UpsertError::pool(e, "testing MSSQL connection"))?
                .into_row()
                .await
                .map_err(|e| UpsertError::pool(e, "testing MSSQL connection"))?;
        }

        info!(
            "Connected to MSSQL: {}:{}/{} (pool_size={})",
            config.host, config.port, config.database, max_connections
        );

        Ok(Self {
            pool,
            max_connections,
        })
    }
}

#[async_trait]
impl Engine for MssqlEngine {
    fn db_type(&self) -> &str {
        "mssql"
    }

    fn pool_size(&self) -> usize {
        self.max_connections
    }

    async fn connect(&self) -> Result<Box<dyn Connection>> {
        let conn = self
            .pool
            .get_owned()
            .await
            .map_err(|e| UpsertError::pool(e, "getting MSSQL connection from pool"))?;
        Ok(Box::new(MssqlConnection { conn }))
    }
}

/// One pooled SQL Server connection.
pub struct MssqlConnection {
    conn: PooledConnection<'static, TiberiusConnectionManager>,
}

impl MssqlConnection {
    /// Run a batch whose result is discarded (transaction control).
    async fn batch(&mut self, sql: &str) -> DbResult<()> {
        self.conn
            .simple_query(sql)
            .await
            .map_err(db_error)?
            .into_results()
            .await
            .map_err(db_error)?;
        Ok(())
    }
}

#[async_trait]
impl Connection for MssqlConnection {
    async fn execute(&mut self, sql: &str) -> DbResult<u64> {
        let result = self.conn.execute(sql, &[]).await.map_err(db_error)?;
        Ok(result.total())
    }

    async fn query(&mut self, sql: &str) -> DbResult<RowSet> {
        let mut stream = self.conn.simple_query(sql).await.map_err(db_error)?;
        let columns: Vec<String> = stream
            .columns()
            .await
            .map_err(db_error)?
            .map(|cols| cols.iter().map(|c| c.name().to_lowercase()).collect())
            .unwrap_or_default();
        let raw = stream.into_first_result().await.map_err(db_error)?;

        let rows = raw
            .into_iter()
            .map(|row| row.into_iter().map(|data| value_from_column(&data)).collect())
            .collect();

        Ok(RowSet::new(columns, rows))
    }

    async fn bulk_insert(&mut self, table: &str, columns: &[String], rows: &[Row]) -> DbResult<u64> {
        if rows.is_empty() || columns.is_empty() {
            return Ok(0);
        }

        let qualified = qualify_mssql(table).map_err(|e| DbError::other(e.to_string()))?;
        let col_list = columns
            .iter()
            .map(|c| quote_mssql(c))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| DbError::other(e.to_string()))?
            .join(", ");

        let num_cols = columns.len();
        check_parameters(rows.len(), num_cols)?;

        let mut param = 0usize;
        let values: Vec<String> = rows
            .iter()
            .map(|_| {
                let placeholders: Vec<String> = (0..num_cols)
                    .map(|_| {
                        param += 1;
                        format!("@P{}", param)
                    })
                    .collect();
                format!("({})", placeholders.join(", "))
            })
            .collect();

        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            qualified,
            col_list,
            values.join(", ")
        );
        let mut query = Query::new(sql);
        for value in rows.iter().flatten() {
            bind_value(&mut query, value);
        }
        query.execute(&mut *self.conn).await.map_err(db_error)?;

        debug!("MSSQL: wrote {} rows to {}", rows.len(), qualified);
        Ok(rows.len() as u64)
    }

    async fn begin(&mut self) -> DbResult<()> {
        self.batch("BEGIN TRANSACTION").await
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.batch("COMMIT TRANSACTION").await
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.batch("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION").await
    }
}

fn check_parameters(rows: usize, columns: usize) -> DbResult<()> {
    let needed = rows.saturating_mul(columns);
    if needed > MAX_PARAMETERS {
        return Err(DbError::with_code(
            ER_TOO_MANY_PARAMETERS,
            format!(
                "{} rows x {} columns needs {} parameters, at most {} allowed",
                rows, columns, needed, MAX_PARAMETERS
            ),
        ));
    }
    Ok(())
}

/// Normalise a driver error, keeping the server error number.
fn db_error(err: tiberius::error::Error) -> DbError {
    match err {
        tiberius::error::Error::Server(token) => DbError::with_code(token.code(), token.message()),
        other => DbError::other(other.to_string()),
    }
}

fn bind_value(query: &mut Query<'_>, value: &SqlValue) {
    match value {
        SqlValue::Null => query.bind(Option::<String>::None),
        SqlValue::Bool(b) => query.bind(*b),
        SqlValue::I64(i) => query.bind(*i),
        SqlValue::U64(u) => match i64::try_from(*u) {
            Ok(i) => query.bind(i),
            Err(_) => query.bind(u.to_string()),
        },
        SqlValue::F64(f) => query.bind(*f),
        SqlValue::Decimal(d) => query.bind(tiberius::numeric::Numeric::new_with_scale(d.mantissa(), d.scale() as u8)),
        SqlValue::Text(s) => query.bind(s.clone()),
        SqlValue::Bytes(b) => query.bind(b.clone()),
        SqlValue::Date(d) => query.bind(*d),
        SqlValue::Time(t) => query.bind(*t),
        SqlValue::DateTime(dt) => query.bind(*dt),
    }
}

fn value_from_column(data: &ColumnData<'static>) -> SqlValue {
    match data {
        ColumnData::U8(v) => v.map_or(SqlValue::Null, |v| SqlValue::I64(i64::from(v))),
        ColumnData::I16(v) => v.map_or(SqlValue::Null, |v| SqlValue::I64(i64::from(v))),
        ColumnData::I32(v) => v.map_or(SqlValue::Null, |v| SqlValue::I64(i64::from(v))),
        ColumnData::I64(v) => v.map_or(SqlValue::Null, SqlValue::I64),
        ColumnData::F32(v) => v.map_or(SqlValue::Null, |v| SqlValue::F64(f64::from(v))),
        ColumnData::F64(v) => v.map_or(SqlValue::Null, SqlValue::F64),
        ColumnData::Bit(v) => v.map_or(SqlValue::Null, SqlValue::Bool),
        ColumnData::String(v) => v
            .as_ref()
            .map_or(SqlValue::Null, |s| SqlValue::Text(s.to_string())),
        ColumnData::Guid(v) => v
            .as_ref()
            .map_or(SqlValue::Null, |g| SqlValue::Text(g.to_string())),
        ColumnData::Binary(v) => v
            .as_ref()
            .map_or(SqlValue::Null, |b| SqlValue::Bytes(b.to_vec())),
        ColumnData::Numeric(v) => v.as_ref().map_or(SqlValue::Null, |n| {
            Decimal::try_from_i128_with_scale(n.value(), u32::from(n.scale()))
                .map(SqlValue::Decimal)
                .unwrap_or_else(|_| SqlValue::Text(n.to_string()))
        }),
        ColumnData::Date(_) => NaiveDate::from_sql(data)
            .ok()
            .flatten()
            .map_or(SqlValue::Null, SqlValue::Date),
        ColumnData::Time(_) => NaiveTime::from_sql(data)
            .ok()
            .flatten()
            .map_or(SqlValue::Null, SqlValue::Time),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(data)
                .ok()
                .flatten()
                .map_or(SqlValue::Null, SqlValue::DateTime)
        }
        ColumnData::DateTimeOffset(_) => chrono::DateTime::<chrono::Utc>::from_sql(data)
            .ok()
            .flatten()
            .map_or(SqlValue::Null, |dt| SqlValue::DateTime(dt.naive_utc())),
        // XML columns are not read back.
        ColumnData::Xml(_) => SqlValue::Null,
    }
}
