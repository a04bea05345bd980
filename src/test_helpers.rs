//! In-memory stand-ins for tests.
//!
//! [`MockExecutor`] implements [`SqlExecutor`] without a database. It
//! understands just enough SQL to back the engine: `CREATE TABLE` /
//! `DROP TABLE` inside migration batches, the bookkeeping statements issued
//! by the applied-state tracker, and `SELECT 1+1`. Transactions snapshot the
//! state on `BEGIN` and restore it on `ROLLBACK`. Every statement is logged
//! so tests can spy on what ran.
//!
//! [`RecordingProgress`] captures progress events instead of printing them.

use crate::executor::{DbError, SqlExecutor};
use crate::progress::{Progress, Style};
use crate::value::{SqlRow, SqlValue};
use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};

static CREATE_TABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)^CREATE\s+TABLE\s+(IF\s+NOT\s+EXISTS\s+)?"?([A-Za-z0-9_]+)"?"#).unwrap()
});
static DROP_TABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)^DROP\s+TABLE\s+(IF\s+EXISTS\s+)?"?([A-Za-z0-9_]+)"?"#).unwrap()
});
static TABLE_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)(?:FROM|INTO)\s+"?([A-Za-z0-9_]+)"?"#).unwrap()
});

type AppliedRows = BTreeMap<(i16, String), NaiveDateTime>;

#[derive(Debug, Clone, Default)]
struct MockState {
    tables: BTreeSet<String>,
    bookkeeping: BTreeMap<String, AppliedRows>,
}

/// In-memory `SqlExecutor` with transaction snapshots and a statement log
#[derive(Debug, Default)]
pub struct MockExecutor {
    state: RefCell<MockState>,
    snapshot: RefCell<Option<MockState>>,
    statements: RefCell<Vec<String>>,
    batches: RefCell<Vec<String>>,
    fail_on: RefCell<Vec<String>>,
    begins: Cell<usize>,
    commits: Cell<usize>,
    rollbacks: Cell<usize>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make any batch or statement containing `needle` fail with a query error
    pub fn fail_on(&self, needle: impl Into<String>) {
        self.fail_on.borrow_mut().push(needle.into());
    }

    /// Pre-create a bookkeeping table (as if an earlier process had done so)
    pub fn create_bookkeeping_table(&self, table: &str) {
        let mut state = self.state.borrow_mut();
        state.tables.insert(table.to_string());
        state.bookkeeping.entry(table.to_string()).or_default();
    }

    /// Seed an applied record directly, bypassing the engine
    pub fn seed_applied(&self, table: &str, version: i16, name: &str, applied: NaiveDateTime) {
        self.create_bookkeeping_table(table);
        self.state
            .borrow_mut()
            .bookkeeping
            .entry(table.to_string())
            .or_default()
            .insert((version, name.to_string()), applied);
    }

    /// Applied `(version, name)` pairs of a bookkeeping table, in key order
    pub fn applied(&self, table: &str) -> Vec<(i16, String)> {
        self.state
            .borrow()
            .bookkeeping
            .get(table)
            .map(|rows| rows.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.state.borrow().tables.contains(table)
    }

    /// Every statement seen, in order (batches, statements and queries)
    pub fn statements(&self) -> Vec<String> {
        self.statements.borrow().clone()
    }

    /// Only the texts passed to `batch_execute`
    pub fn batches(&self) -> Vec<String> {
        self.batches.borrow().clone()
    }

    pub fn begin_count(&self) -> usize {
        self.begins.get()
    }

    pub fn commit_count(&self) -> usize {
        self.commits.get()
    }

    pub fn rollback_count(&self) -> usize {
        self.rollbacks.get()
    }

    fn injected_failure(&self, sql: &str) -> Option<DbError> {
        self.fail_on
            .borrow()
            .iter()
            .find(|needle| sql.contains(needle.as_str()))
            .map(|needle| DbError::Query(format!("syntax error at or near \"{needle}\"")))
    }

    fn table_of(sql: &str) -> Result<String, DbError> {
        TABLE_REF
            .captures(sql)
            .map(|caps| caps[1].to_string())
            .ok_or_else(|| DbError::Query(format!("mock cannot find a table in: {sql}")))
    }

    fn with_bookkeeping<T>(
        &self,
        sql: &str,
        f: impl FnOnce(&mut AppliedRows) -> Result<T, DbError>,
    ) -> Result<T, DbError> {
        let table = Self::table_of(sql)?;
        let mut state = self.state.borrow_mut();
        let rows = state
            .bookkeeping
            .get_mut(&table)
            .ok_or_else(|| DbError::Query(format!("relation \"{table}\" does not exist")))?;
        f(rows)
    }

    fn run_ddl(&self, statement: &str) -> Result<(), DbError> {
        if let Some(caps) = CREATE_TABLE.captures(statement) {
            let name = caps[2].to_string();
            let mut state = self.state.borrow_mut();
            if state.tables.contains(&name) {
                if caps.get(1).is_none() {
                    return Err(DbError::Query(format!("relation \"{name}\" already exists")));
                }
                return Ok(());
            }
            if statement.contains("\"version\"") && statement.contains("\"applied\"") {
                state.bookkeeping.insert(name.clone(), AppliedRows::new());
            }
            state.tables.insert(name);
        } else if let Some(caps) = DROP_TABLE.captures(statement) {
            let name = caps[2].to_string();
            let mut state = self.state.borrow_mut();
            if !state.tables.remove(&name) && caps.get(1).is_none() {
                return Err(DbError::Query(format!("table \"{name}\" does not exist")));
            }
            state.bookkeeping.remove(&name);
        }
        Ok(())
    }

    fn param_version(params: &[SqlValue], idx: usize) -> Result<i16, DbError> {
        params
            .get(idx)
            .and_then(SqlValue::as_i64)
            .and_then(|v| i16::try_from(v).ok())
            .ok_or_else(|| DbError::Query(format!("expected smallint parameter ${}", idx + 1)))
    }

    fn param_text(params: &[SqlValue], idx: usize) -> Result<String, DbError> {
        params
            .get(idx)
            .and_then(SqlValue::as_str)
            .map(str::to_string)
            .ok_or_else(|| DbError::Query(format!("expected text parameter ${}", idx + 1)))
    }

    fn param_timestamp(params: &[SqlValue], idx: usize) -> Result<NaiveDateTime, DbError> {
        params
            .get(idx)
            .and_then(SqlValue::as_timestamp)
            .ok_or_else(|| DbError::Query(format!("expected timestamp parameter ${}", idx + 1)))
    }

    fn record_row(version: i16, name: &str, applied: NaiveDateTime) -> SqlRow {
        SqlRow::new(vec![
            ("version", SqlValue::SmallInt(version)),
            ("name", SqlValue::Text(name.to_string())),
            ("applied", SqlValue::Timestamp(applied)),
        ])
    }

    fn count_row(count: usize) -> SqlRow {
        SqlRow::new(vec![("count", SqlValue::BigInt(count as i64))])
    }
}

impl SqlExecutor for MockExecutor {
    fn batch_execute(&self, sql: &str) -> Result<(), DbError> {
        self.statements.borrow_mut().push(sql.to_string());
        self.batches.borrow_mut().push(sql.to_string());
        if let Some(err) = self.injected_failure(sql) {
            return Err(err);
        }
        for statement in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            self.run_ddl(statement)?;
        }
        Ok(())
    }

    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, DbError> {
        self.statements.borrow_mut().push(sql.to_string());
        if let Some(err) = self.injected_failure(sql) {
            return Err(err);
        }
        let normalized = sql.trim_start().to_ascii_uppercase();

        if normalized.starts_with("INSERT INTO") {
            let version = Self::param_version(params, 0)?;
            let name = Self::param_text(params, 1)?;
            let applied = Self::param_timestamp(params, 2)?;
            return self.with_bookkeeping(sql, |rows| {
                if rows.contains_key(&(version, name.clone())) {
                    return Err(DbError::Query(
                        "duplicate key value violates unique constraint".to_string(),
                    ));
                }
                rows.insert((version, name), applied);
                Ok(1)
            });
        }

        if normalized.starts_with("DELETE FROM") {
            let version = Self::param_version(params, 0)?;
            let name = Self::param_text(params, 1)?;
            return self.with_bookkeeping(sql, |rows| {
                Ok(u64::from(rows.remove(&(version, name)).is_some()))
            });
        }

        self.run_ddl(sql.trim())?;
        Ok(0)
    }

    fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>, DbError> {
        self.statements.borrow_mut().push(sql.to_string());
        let normalized = sql.split_whitespace().collect::<Vec<_>>().join(" ");

        if normalized.starts_with("SELECT 1+1") {
            return Ok(vec![SqlRow::new(vec![("test", SqlValue::Int(2))])]);
        }

        if normalized.starts_with("SELECT COUNT(1)") {
            if normalized.contains("\"version\" = $1") {
                let version = Self::param_version(params, 0)?;
                let name = Self::param_text(params, 1)?;
                return self.with_bookkeeping(sql, |rows| {
                    Ok(vec![Self::count_row(usize::from(
                        rows.contains_key(&(version, name)),
                    ))])
                });
            }
            if normalized.contains("\"applied\" >= $1") {
                let since = Self::param_timestamp(params, 0)?;
                return self.with_bookkeeping(sql, |rows| {
                    Ok(vec![Self::count_row(
                        rows.values().filter(|applied| **applied >= since).count(),
                    )])
                });
            }
            return self.with_bookkeeping(sql, |rows| Ok(vec![Self::count_row(rows.len())]));
        }

        if normalized.starts_with("SELECT \"version\", \"name\", \"applied\"") {
            if normalized.contains("\"version\" > $1") {
                let target = Self::param_version(params, 0)?;
                return self.with_bookkeeping(sql, |rows| {
                    let mut selected: Vec<_> = rows
                        .iter()
                        .filter(|((version, _), _)| *version > target)
                        .collect();
                    // ORDER BY "version" DESC, "name" DESC
                    selected.sort_by(|a, b| b.0.cmp(a.0));
                    Ok(selected
                        .into_iter()
                        .map(|((version, name), applied)| Self::record_row(*version, name, *applied))
                        .collect())
                });
            }
            return self.with_bookkeeping(sql, |rows| {
                Ok(rows
                    .iter()
                    .map(|((version, name), applied)| Self::record_row(*version, name, *applied))
                    .collect())
            });
        }

        Err(DbError::Query(format!("mock does not understand query: {sql}")))
    }

    fn in_transaction(&self) -> bool {
        self.snapshot.borrow().is_some()
    }

    fn begin(&self) -> Result<(), DbError> {
        if self.in_transaction() {
            return Err(DbError::Transaction(
                "There is already an active transaction".to_string(),
            ));
        }
        self.statements.borrow_mut().push("BEGIN".to_string());
        *self.snapshot.borrow_mut() = Some(self.state.borrow().clone());
        self.begins.set(self.begins.get() + 1);
        Ok(())
    }

    fn commit(&self) -> Result<(), DbError> {
        if self.snapshot.borrow_mut().take().is_none() {
            return Err(DbError::Transaction(
                "There is no active transaction to commit".to_string(),
            ));
        }
        self.statements.borrow_mut().push("COMMIT".to_string());
        self.commits.set(self.commits.get() + 1);
        Ok(())
    }

    fn rollback(&self) -> Result<(), DbError> {
        let snapshot = self.snapshot.borrow_mut().take().ok_or_else(|| {
            DbError::Transaction("There is no active transaction to roll back".to_string())
        })?;
        self.statements.borrow_mut().push("ROLLBACK".to_string());
        *self.state.borrow_mut() = snapshot;
        self.rollbacks.set(self.rollbacks.get() + 1);
        Ok(())
    }
}

/// One captured progress call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Announce(String, Style),
    Update(String, Style),
}

/// `Progress` sink that records events for assertions
#[derive(Debug, Default)]
pub struct RecordingProgress {
    events: RefCell<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.borrow().clone()
    }

    /// Messages of `update_previous` calls, in order
    pub fn updates(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                ProgressEvent::Update(message, _) => Some(message.clone()),
                ProgressEvent::Announce(..) => None,
            })
            .collect()
    }

    /// Messages of `announce` calls, in order
    pub fn announcements(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                ProgressEvent::Announce(message, _) => Some(message.clone()),
                ProgressEvent::Update(..) => None,
            })
            .collect()
    }
}

impl Progress for RecordingProgress {
    fn announce(&self, message: &str, style: Style) {
        self.events
            .borrow_mut()
            .push(ProgressEvent::Announce(message.to_string(), style));
    }

    fn update_previous(&self, message: &str, style: Style) {
        self.events
            .borrow_mut()
            .push(ProgressEvent::Update(message.to_string(), style));
    }
}
