//! MySQL/MariaDB engine over `mysql_async`.
//!
//! Each checked-out [`MysqlConnection`] wraps one pooled `Conn`; dropping it
//! hands the connection back to the pool.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts, SslOpts, Value};
use tracing::{debug, info, warn};

use crate::config::TargetConfig;
use crate::core::identifier::{qualify_mysql, quote_mysql};
use crate::core::traits::{Connection, Engine};
use crate::core::value::{Row, RowSet, SqlValue};
use crate::error::{DbError, DbResult, Result, UpsertError};

use super::dialect::{ER_PS_MANY_PARAM, MAX_PLACEHOLDERS};

/// Pooled MySQL engine.
pub struct MysqlEngine {
    pool: Pool,
    max_connections: usize,
}

impl MysqlEngine {
    /// Create the pool from configuration and verify one connection.
    pub async fn new(config: &TargetConfig, max_connections: usize) -> Result<Self> {
        let ssl_opts = match config.ssl_mode.to_lowercase().as_str() {
            "disable" => {
                warn!("MySQL TLS is disabled. Credentials will be transmitted in plaintext.");
                None
            }
            "prefer" | "require" => Some(SslOpts::default().with_danger_accept_invalid_certs(true)),
            "verify-ca" | "verify_ca" | "verify-full" | "verify_identity" => Some(SslOpts::default()),
            _ => {
                warn!(
                    "Unknown ssl_mode '{}', defaulting to Preferred",
                    config.ssl_mode
                );
                Some(SslOpts::default().with_danger_accept_invalid_certs(true))
            }
        };

        let mut builder = OptsBuilder::default()
            .ip_or_hostname(&config.host)
            .tcp_port(config.port)
            .db_name(Some(&config.database))
            .user(Some(&config.user))
            .pass(Some(&config.password))
            .init(vec!["SET NAMES utf8mb4"]);

        if let Some(ssl) = ssl_opts {
            builder = builder.ssl_opts(ssl);
        }

        let max_connections = max_connections.max(1);
        let constraints = PoolConstraints::new(1, max_connections).ok_or_else(|| {
            UpsertError::Config(format!("Invalid MySQL pool size {}", max_connections))
        })?;
        let opts: Opts = builder
            .pool_opts(PoolOpts::new().with_constraints(constraints))
            .into();
        let pool = Pool::new(opts);

        let mut conn = pool
            .get_conn()
            .await
            .map_err(|e| UpsertError::pool(e, "creating MySQL pool"))?;
        conn.query_drop("SELECT 1")
            .await
            .map_err(|e| UpsertError::pool(e, "testing MySQL connection"))?;
        drop(conn);

        info!(
            "Connected to MySQL: {}:{}/{} (pool_size={})",
            config.host, config.port, config.database, max_connections
        );

        Ok(Self {
            pool,
            max_connections,
        })
    }
}

#[async_trait]
impl Engine for MysqlEngine {
    fn db_type(&self) -> &str {
        "mysql"
    }

    fn pool_size(&self) -> usize {
        self.max_connections
    }

    async fn connect(&self) -> Result<Box<dyn Connection>> {
        let conn = self
            .pool
            .get_conn()
            .await
            .map_err(|e| UpsertError::pool(e, "getting MySQL connection"))?;
        Ok(Box::new(MysqlConnection { conn }))
    }
}

/// One pooled MySQL connection.
pub struct MysqlConnection {
    conn: Conn,
}

#[async_trait]
impl Connection for MysqlConnection {
    async fn execute(&mut self, sql: &str) -> DbResult<u64> {
        self.conn.query_drop(sql).await.map_err(db_error)?;
        Ok(self.conn.affected_rows())
    }

    async fn query(&mut self, sql: &str) -> DbResult<RowSet> {
        let mut result = self.conn.query_iter(sql).await.map_err(db_error)?;
        let columns: Vec<String> = result
            .columns_ref()
            .iter()
            .map(|c| c.name_str().to_lowercase())
            .collect();
        let raw: Vec<mysql_async::Row> = result.collect().await.map_err(db_error)?;

        let rows = raw
            .iter()
            .map(|row| {
                (0..row.len())
                    .map(|i| row.as_ref(i).map(value_from_mysql).unwrap_or(SqlValue::Null))
                    .collect()
            })
            .collect();

        Ok(RowSet::new(columns, rows))
    }

    async fn bulk_insert(&mut self, table: &str, columns: &[String], rows: &[Row]) -> DbResult<u64> {
        if rows.is_empty() || columns.is_empty() {
            return Ok(0);
        }

        let qualified = qualify_mysql(table)
            .map_err(|e| DbError::other(e.to_string()))?;
        let col_list = columns
            .iter()
            .map(|c| quote_mysql(c))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| DbError::other(e.to_string()))?
            .join(", ");

        check_placeholders(rows.len(), columns.len())?;

        // One statement per call: a rejected batch leaves nothing behind.
        let row_placeholders = format!("({})", vec!["?"; columns.len()].join(", "));
        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            qualified,
            col_list,
            vec![row_placeholders.as_str(); rows.len()].join(", ")
        );
        let params: Vec<Value> = rows
            .iter()
            .flat_map(|row| row.iter().map(value_to_mysql))
            .collect();

        self.conn.exec_drop(sql.as_str(), params).await.map_err(db_error)?;

        debug!("MySQL: wrote {} rows to {}", rows.len(), qualified);
        Ok(rows.len() as u64)
    }

    /// `mysql_async::Transaction` borrows the `Conn` for its lifetime, which
    /// cannot span separate trait calls, so the statements go out directly.
    async fn begin(&mut self) -> DbResult<()> {
        self.conn.query_drop("START TRANSACTION").await.map_err(db_error)
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.conn.query_drop("COMMIT").await.map_err(db_error)
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.conn.query_drop("ROLLBACK").await.map_err(db_error)
    }
}

/// Refuse a batch that would need more placeholders than one statement takes.
fn check_placeholders(rows: usize, columns: usize) -> DbResult<()> {
    let needed = rows.saturating_mul(columns);
    if needed > MAX_PLACEHOLDERS {
        return Err(DbError::with_code(
            ER_PS_MANY_PARAM,
            format!(
                "{} rows x {} columns needs {} placeholders, at most {} allowed",
                rows, columns, needed, MAX_PLACEHOLDERS
            ),
        ));
    }
    Ok(())
}

/// Normalise a driver error, keeping the server error code.
fn db_error(err: mysql_async::Error) -> DbError {
    match err {
        mysql_async::Error::Server(server) => DbError::with_code(server.code as u32, server.message),
        other => DbError::other(other.to_string()),
    }
}

fn value_to_mysql(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::NULL,
        SqlValue::Bool(b) => Value::Int(i64::from(*b)),
        SqlValue::I64(i) => Value::Int(*i),
        SqlValue::U64(u) => Value::UInt(*u),
        SqlValue::F64(f) => Value::Double(*f),
        SqlValue::Decimal(d) => Value::Bytes(d.to_string().into_bytes()),
        SqlValue::Text(s) => Value::Bytes(s.as_bytes().to_vec()),
        SqlValue::Bytes(b) => Value::Bytes(b.clone()),
        SqlValue::Date(d) => Value::Date(d.year() as u16, d.month() as u8, d.day() as u8, 0, 0, 0, 0),
        SqlValue::Time(t) => Value::Time(
            false,
            0,
            t.hour() as u8,
            t.minute() as u8,
            t.second() as u8,
            micros(t.nanosecond()),
        ),
        SqlValue::DateTime(dt) => Value::Date(
            dt.year() as u16,
            dt.month() as u8,
            dt.day() as u8,
            dt.hour() as u8,
            dt.minute() as u8,
            dt.second() as u8,
            micros(dt.nanosecond()),
        ),
    }
}

fn value_from_mysql(value: &Value) -> SqlValue {
    match value {
        Value::NULL => SqlValue::Null,
        Value::Bytes(b) => match std::str::from_utf8(b) {
            Ok(s) => SqlValue::Text(s.to_string()),
            Err(_) => SqlValue::Bytes(b.clone()),
        },
        Value::Int(i) => SqlValue::I64(*i),
        Value::UInt(u) => SqlValue::U64(*u),
        Value::Float(f) => SqlValue::F64(f64::from(*f)),
        Value::Double(f) => SqlValue::F64(*f),
        Value::Date(y, m, d, h, mi, s, us) => NaiveDate::from_ymd_opt(*y as i32, *m as u32, *d as u32)
            .and_then(|date| date.and_hms_micro_opt(*h as u32, *mi as u32, *s as u32, *us))
            .map_or(SqlValue::Null, SqlValue::DateTime),
        Value::Time(negative, days, h, mi, s, us) => {
            if !negative && *days == 0 {
                NaiveTime::from_hms_micro_opt(*h as u32, *mi as u32, *s as u32, *us)
                    .map_or(SqlValue::Null, SqlValue::Time)
            } else {
                let sign = if *negative { "-" } else { "" };
                let hours = u64::from(*days) * 24 + u64::from(*h);
                SqlValue::Text(format!("{}{:02}:{:02}:{:02}.{:06}", sign, hours, mi, s, us))
            }
        }
    }
}

fn micros(nanos: u32) -> u32 {
    (nanos / 1_000).min(999_999)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_guard() {
        assert!(check_placeholders(21845, 3).is_ok());
        let err = check_placeholders(21846, 3).unwrap_err();
        assert_eq!(err.code, Some(ER_PS_MANY_PARAM));
    }

    #[test]
    fn test_value_round_trip_of_temporal() {
        let dt = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_micro_opt(13, 5, 7, 250)
            .unwrap();
        let v = value_to_mysql(&SqlValue::DateTime(dt));
        assert_eq!(v, Value::Date(2024, 2, 29, 13, 5, 7, 250));
        assert_eq!(value_from_mysql(&v), SqlValue::DateTime(dt));
    }

    #[test]
    fn test_text_protocol_bytes_become_text() {
        assert_eq!(
            value_from_mysql(&Value::Bytes(b"12.50".to_vec())),
            SqlValue::from("12.50")
        );
        assert_eq!(
            value_from_mysql(&Value::Bytes(vec![0xff, 0xfe])),
            SqlValue::Bytes(vec![0xff, 0xfe])
        );
    }

    #[test]
    fn test_zero_date_is_null() {
        assert_eq!(value_from_mysql(&Value::Date(0, 0, 0, 0, 0, 0, 0)), SqlValue::Null);
    }

    #[test]
    fn test_scalars_to_mysql() {
        assert_eq!(value_to_mysql(&SqlValue::Bool(true)), Value::Int(1));
        assert_eq!(value_to_mysql(&SqlValue::Null), Value::NULL);
        assert_eq!(
            value_to_mysql(&SqlValue::Decimal(rust_decimal::Decimal::new(1250, 2))),
            Value::Bytes(b"12.50".to_vec())
        );
    }
}
