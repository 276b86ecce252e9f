//! In-memory MySQL stand-in for pipeline tests.
//!
//! Understands exactly the statement shapes the MySQL dialect emits and
//! records every statement it sees.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sql_upsert::drivers::MysqlDialect;
use sql_upsert::error::{DbError, DbResult};
use sql_upsert::{Connection, DialectImpl, Engine, Row, RowSet, SqlValue, UpsertClient};

#[derive(Debug, Clone, Default)]
pub struct FakeTable {
    pub columns: Vec<(String, String)>,
    pub rows: Vec<Row>,
}

impl FakeTable {
    fn index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|(c, _)| c == column)
    }
}

#[derive(Debug, Default)]
struct FakeState {
    tables: HashMap<String, FakeTable>,
    statements: Vec<String>,
    open: usize,
    max_open: usize,
    payload_limit: Option<usize>,
    insert_attempts: Vec<usize>,
    fail_load: Vec<String>,
    fail_merge: Vec<String>,
    fail_drop: Vec<String>,
    fail_alter: Vec<String>,
    drops: HashMap<String, usize>,
}

#[derive(Clone)]
pub struct FakeEngine {
    state: Arc<Mutex<FakeState>>,
    pool_size: usize,
    load_delay: Duration,
}

impl FakeEngine {
    pub fn new(pool_size: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState::default())),
            pool_size,
            load_delay: Duration::from_millis(0),
        }
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn client(&self) -> UpsertClient {
        UpsertClient::new(
            Arc::new(self.clone()),
            DialectImpl::Mysql(MysqlDialect::new()),
        )
    }

    pub fn create_table(&self, name: &str, columns: &[(&str, &str)], rows: Vec<Row>) {
        let table = FakeTable {
            columns: columns
                .iter()
                .map(|(c, t)| (c.to_string(), t.to_string()))
                .collect(),
            rows,
        };
        self.lock().tables.insert(name.to_string(), table);
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        let mut rows = self
            .lock()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default();
        rows.sort_by_key(|r| match r.first() {
            Some(SqlValue::I64(id)) => *id,
            _ => i64::MAX,
        });
        rows
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.lock().tables.contains_key(table)
    }

    pub fn statements(&self) -> Vec<String> {
        self.lock().statements.clone()
    }

    pub fn count_statements(&self, prefix: &str) -> usize {
        self.lock()
            .statements
            .iter()
            .filter(|s| s.starts_with(prefix))
            .count()
    }

    pub fn max_open(&self) -> usize {
        self.lock().max_open
    }

    pub fn insert_attempts(&self) -> Vec<usize> {
        self.lock().insert_attempts.clone()
    }

    /// Reject load batches with more than `rows` rows as packet-too-large.
    pub fn set_payload_limit(&self, rows: usize) {
        self.lock().payload_limit = Some(rows);
    }

    /// Fail loads into staging tables of `table` with a non-size error.
    pub fn fail_load(&self, table: &str) {
        self.lock().fail_load.push(format!("{}_", table));
    }

    /// Fail the merge statement targeting `table`.
    pub fn fail_merge(&self, table: &str) {
        self.lock().fail_merge.push(table.to_string());
    }

    /// Fail every DROP of a staging table of `table` except the first,
    /// pre-clean one.
    pub fn fail_drop(&self, table: &str) {
        self.lock().fail_drop.push(format!("{}_", table));
    }

    /// Fail `ALTER TABLE` statements on `table`.
    pub fn fail_alter(&self, table: &str) {
        self.lock().fail_alter.push(table.to_string());
    }

    /// Names of all tables, sorted.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().tables.keys().cloned().collect();
        names.sort();
        names
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl Engine for FakeEngine {
    fn db_type(&self) -> &str {
        "mysql"
    }

    fn pool_size(&self) -> usize {
        self.pool_size
    }

    async fn connect(&self) -> sql_upsert::Result<Box<dyn Connection>> {
        {
            let mut state = self.lock();
            state.open += 1;
            state.max_open = state.max_open.max(state.open);
        }
        Ok(Box::new(FakeConnection {
            state: self.state.clone(),
            load_delay: self.load_delay,
        }))
    }
}

pub struct FakeConnection {
    state: Arc<Mutex<FakeState>>,
    load_delay: Duration,
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.open -= 1;
        }
    }
}

impl FakeConnection {
    fn record(&self, sql: &str) {
        self.state.lock().unwrap().statements.push(sql.to_string());
    }
}

#[async_trait]
impl Connection for FakeConnection {
    async fn execute(&mut self, sql: &str) -> DbResult<u64> {
        self.record(sql);
        let mut state = self.state.lock().unwrap();

        if sql.starts_with("DROP ") {
            if let Some(name) = backtick_tokens(sql).pop() {
                let seen = state.drops.entry(name.clone()).or_insert(0);
                *seen += 1;
                let repeat = *seen > 1;
                if repeat && state.fail_drop.iter().any(|p| name.starts_with(p.as_str())) {
                    return Err(DbError::with_code(2013, "Lost connection to MySQL server"));
                }
                state.tables.remove(&name);
            }
            return Ok(0);
        }

        if sql.starts_with("ALTER ") {
            let target = backtick_tokens(sql).first().cloned().unwrap_or_default();
            if state.fail_alter.contains(&target) {
                return Err(DbError::with_code(1205, "Lock wait timeout exceeded"));
            }
            return Ok(0);
        }

        if sql.starts_with("CREATE ") {
            let tokens = backtick_tokens(sql);
            let (name, columns) = tokens
                .split_first()
                .ok_or_else(|| DbError::with_code(1064, "syntax error"))?;
            if state.tables.contains_key(name) {
                return Err(DbError::with_code(1050, format!("Table '{}' already exists", name)));
            }
            let table = FakeTable {
                columns: columns.iter().map(|c| (c.clone(), String::new())).collect(),
                rows: Vec::new(),
            };
            state.tables.insert(name.clone(), table);
            return Ok(0);
        }

        if let Some(mode) = merge_mode(sql) {
            return merge(&mut state, sql, mode);
        }

        Ok(0)
    }

    async fn query(&mut self, sql: &str) -> DbResult<RowSet> {
        self.record(sql);
        let state = self.state.lock().unwrap();

        if let Some(rest) = sql.strip_prefix("SHOW FULL COLUMNS FROM ") {
            let name = backtick_tokens(rest).pop().unwrap_or_default();
            let table = state.tables.get(&name).ok_or_else(|| {
                DbError::with_code(1146, format!("Table '{}' doesn't exist", name))
            })?;
            let rows = table
                .columns
                .iter()
                .map(|(c, t)| vec![SqlValue::from(c.as_str()), SqlValue::from(t.as_str())])
                .collect();
            return Ok(RowSet::new(vec!["Field".into(), "Type".into()], rows));
        }

        if let Some(rest) = sql.strip_prefix("SELECT ") {
            let (head, tail) = rest
                .split_once(" FROM ")
                .ok_or_else(|| DbError::with_code(1064, "syntax error"))?;
            let name = backtick_tokens(tail).first().cloned().unwrap_or_default();
            let table = state.tables.get(&name).ok_or_else(|| {
                DbError::with_code(1146, format!("Table '{}' doesn't exist", name))
            })?;
            let wanted: Vec<String> = if head.trim() == "*" {
                table.columns.iter().map(|(c, _)| c.clone()).collect()
            } else {
                backtick_tokens(head)
            };
            let all = RowSet::new(
                table.columns.iter().map(|(c, _)| c.clone()).collect(),
                table.rows.clone(),
            );
            return Ok(all.select(&wanted));
        }

        Ok(RowSet::default())
    }

    async fn bulk_insert(&mut self, table: &str, columns: &[String], rows: &[Row]) -> DbResult<u64> {
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.insert_attempts.push(rows.len());

        if state.fail_load.iter().any(|p| table.starts_with(p.as_str())) {
            return Err(DbError::with_code(2013, "Lost connection to MySQL server"));
        }
        if let Some(limit) = state.payload_limit {
            if rows.len() > limit {
                return Err(DbError::with_code(1153, "Got a packet bigger than 'max_allowed_packet' bytes"));
            }
        }

        let staging = state
            .tables
            .get_mut(table)
            .ok_or_else(|| DbError::with_code(1146, format!("Table '{}' doesn't exist", table)))?;
        let positions: Vec<Option<usize>> = staging
            .columns
            .iter()
            .map(|(c, _)| columns.iter().position(|given| given.eq_ignore_ascii_case(c)))
            .collect();
        for row in rows {
            staging.rows.push(
                positions
                    .iter()
                    .map(|p| p.and_then(|i| row.get(i).cloned()).unwrap_or(SqlValue::Null))
                    .collect(),
            );
        }
        Ok(rows.len() as u64)
    }

    async fn begin(&mut self) -> DbResult<()> {
        self.record("BEGIN");
        Ok(())
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.record("COMMIT");
        Ok(())
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.record("ROLLBACK");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum MergeMode {
    Force,
    New,
    Old,
    Ignore,
    Replace,
}

fn merge_mode(sql: &str) -> Option<MergeMode> {
    if sql.starts_with("INSERT IGNORE INTO ") {
        Some(MergeMode::Ignore)
    } else if sql.starts_with("REPLACE INTO ") {
        Some(MergeMode::Replace)
    } else if sql.starts_with("INSERT INTO ") {
        if sql.contains("COALESCE(VALUES(") {
            Some(MergeMode::New)
        } else if sql.contains("COALESCE(`") {
            Some(MergeMode::Old)
        } else {
            Some(MergeMode::Force)
        }
    } else {
        None
    }
}

/// Apply a staging merge keyed on the `id` column.
fn merge(state: &mut FakeState, sql: &str, mode: MergeMode) -> DbResult<u64> {
    let (head, tail) = sql
        .split_once(" SELECT ")
        .ok_or_else(|| DbError::with_code(1064, "syntax error"))?;
    let head_tokens = backtick_tokens(head);
    let (target_name, columns) = head_tokens
        .split_first()
        .ok_or_else(|| DbError::with_code(1064, "syntax error"))?;
    let from = tail
        .split_once(" FROM ")
        .map(|(_, f)| f)
        .ok_or_else(|| DbError::with_code(1064, "syntax error"))?;
    let staging_name = backtick_tokens(from).first().cloned().unwrap_or_default();

    if state.fail_merge.contains(target_name) {
        return Err(DbError::with_code(1213, "Deadlock found when trying to get lock"));
    }

    let staging = state
        .tables
        .get(&staging_name)
        .cloned()
        .ok_or_else(|| DbError::with_code(1146, format!("Table '{}' doesn't exist", staging_name)))?;
    let target = state
        .tables
        .get_mut(target_name)
        .ok_or_else(|| DbError::with_code(1146, format!("Table '{}' doesn't exist", target_name)))?;
    let key = target
        .index("id")
        .ok_or_else(|| DbError::with_code(1072, "no id column"))?;

    let mut affected = 0;
    for staged in &staging.rows {
        let incoming: HashMap<&str, &SqlValue> = columns
            .iter()
            .filter_map(|c| {
                let idx = staging.index(c)?;
                Some((c.as_str(), staged.get(idx)?))
            })
            .collect();
        let id = incoming.get("id").cloned().cloned().unwrap_or(SqlValue::Null);
        let fresh: Row = target
            .columns
            .iter()
            .map(|(c, _)| incoming.get(c.as_str()).cloned().cloned().unwrap_or(SqlValue::Null))
            .collect();

        let existing = target.rows.iter().position(|r| r.get(key) == Some(&id));
        match (existing, mode) {
            (None, _) => {
                target.rows.push(fresh);
                affected += 1;
            }
            (Some(_), MergeMode::Ignore) => {}
            (Some(pos), MergeMode::Replace) => {
                target.rows[pos] = fresh;
                affected += 2;
            }
            (Some(pos), policy) => {
                let current = target.rows[pos].clone();
                let mut updated = current.clone();
                for (i, (column, _)) in target.columns.iter().enumerate() {
                    let Some(new) = incoming.get(column.as_str()) else {
                        continue;
                    };
                    updated[i] = match policy {
                        MergeMode::New if new.is_null() => current[i].clone(),
                        MergeMode::Old if !current[i].is_null() => current[i].clone(),
                        _ => (*new).clone(),
                    };
                }
                if updated != current {
                    target.rows[pos] = updated;
                    affected += 2;
                }
            }
        }
    }
    Ok(affected)
}

/// Unquoted contents of every backtick-quoted identifier in `sql`.
fn backtick_tokens(sql: &str) -> Vec<String> {
    sql.split('`')
        .enumerate()
        .filter(|(i, _)| i % 2 == 1)
        .map(|(_, s)| s.to_string())
        .collect()
}

pub fn ids_rows(values: &[(i64, Option<i64>, Option<i64>)]) -> RowSet {
    RowSet::new(
        vec!["id".into(), "a".into(), "b".into()],
        values
            .iter()
            .map(|(id, a, b)| vec![SqlValue::I64(*id), (*a).into(), (*b).into()])
            .collect(),
    )
}
