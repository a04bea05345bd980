//! `SqlExecutor` - the transactional SQL capability the migration engine runs on.
//!
//! The engine never talks to a driver directly. It is handed something that
//! implements [`SqlExecutor`]: [`PgExecutor`] over `may_postgres` in
//! production, or an in-memory fake in tests.

use crate::value::{decode_row, with_converted_params, SqlRow, SqlValue};
use may_postgres::{Client, Error as PostgresError};
use std::cell::Cell;
use std::fmt;

/// Executor error type
///
/// This is the "opaque passthrough" class of the engine's error taxonomy:
/// a failing migration surfaces the `DbError` it produced unchanged.
#[derive(Debug)]
pub enum DbError {
    /// `PostgreSQL` error from `may_postgres`
    Postgres(PostgresError),
    /// Connection could not be established or was lost
    Connection(String),
    /// Query execution error
    Query(String),
    /// Row parsing/conversion error
    Parse(String),
    /// Transaction state misuse (commit without begin, nested begin, ...)
    Transaction(String),
    /// Other execution errors
    Other(String),
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbError::Postgres(e) => write!(f, "PostgreSQL error: {e}"),
            DbError::Connection(s) => write!(f, "Connection error: {s}"),
            DbError::Query(s) => write!(f, "Query error: {s}"),
            DbError::Parse(s) => write!(f, "Parse error: {s}"),
            DbError::Transaction(s) => write!(f, "Transaction error: {s}"),
            DbError::Other(s) => write!(f, "Execution error: {s}"),
        }
    }
}

impl std::error::Error for DbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DbError::Postgres(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PostgresError> for DbError {
    fn from(err: PostgresError) -> Self {
        DbError::Postgres(err)
    }
}

/// Transactional SQL executor
///
/// All calls block the calling coroutine/thread until the database answers.
/// Transaction state is owned by the executor: `begin`/`commit`/`rollback`
/// operate on a single, non-nested transaction and `in_transaction` reports
/// whether one is open.
pub trait SqlExecutor {
    /// Execute a (possibly multi-statement) SQL text without parameters
    ///
    /// # Errors
    ///
    /// Returns the driver error if any statement fails.
    fn batch_execute(&self, sql: &str) -> Result<(), DbError>;

    /// Execute a single parameterized statement, returning rows affected
    ///
    /// Parameters are bound positionally (`$1`, `$2`, ...).
    ///
    /// # Errors
    ///
    /// Returns the driver error if execution fails.
    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, DbError>;

    /// Execute a parameterized query and return all rows
    ///
    /// # Errors
    ///
    /// Returns the driver error if execution or row decoding fails.
    fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>, DbError>;

    /// Whether a transaction is currently open on this executor
    fn in_transaction(&self) -> bool;

    /// Open a transaction
    ///
    /// # Errors
    ///
    /// Returns `DbError::Transaction` if one is already open.
    fn begin(&self) -> Result<(), DbError>;

    /// Commit the open transaction
    ///
    /// # Errors
    ///
    /// Returns `DbError::Transaction` if none is open.
    fn commit(&self) -> Result<(), DbError>;

    /// Roll back the open transaction
    ///
    /// # Errors
    ///
    /// Returns `DbError::Transaction` if none is open.
    fn rollback(&self) -> Result<(), DbError>;
}

impl<T: SqlExecutor + ?Sized> SqlExecutor for &T {
    fn batch_execute(&self, sql: &str) -> Result<(), DbError> {
        (**self).batch_execute(sql)
    }

    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, DbError> {
        (**self).execute(sql, params)
    }

    fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>, DbError> {
        (**self).query(sql, params)
    }

    fn in_transaction(&self) -> bool {
        (**self).in_transaction()
    }

    fn begin(&self) -> Result<(), DbError> {
        (**self).begin()
    }

    fn commit(&self) -> Result<(), DbError> {
        (**self).commit()
    }

    fn rollback(&self) -> Result<(), DbError> {
        (**self).rollback()
    }
}

impl<T: SqlExecutor + ?Sized> SqlExecutor for Box<T> {
    fn batch_execute(&self, sql: &str) -> Result<(), DbError> {
        (**self).batch_execute(sql)
    }

    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, DbError> {
        (**self).execute(sql, params)
    }

    fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>, DbError> {
        (**self).query(sql, params)
    }

    fn in_transaction(&self) -> bool {
        (**self).in_transaction()
    }

    fn begin(&self) -> Result<(), DbError> {
        (**self).begin()
    }

    fn commit(&self) -> Result<(), DbError> {
        (**self).commit()
    }

    fn rollback(&self) -> Result<(), DbError> {
        (**self).rollback()
    }
}

/// Implementation of `SqlExecutor` for `may_postgres::Client`
///
/// The client runs in autocommit mode; `begin` issues `BEGIN` and the
/// executor remembers that a transaction is open until `COMMIT`/`ROLLBACK`.
/// SQL text that manages its own transactions behind the executor's back is
/// not tracked.
pub struct PgExecutor {
    client: Client,
    in_transaction: Cell<bool>,
}

impl PgExecutor {
    /// Create a new executor from a `may_postgres::Client`
    pub fn new(client: Client) -> Self {
        Self {
            client,
            in_transaction: Cell::new(false),
        }
    }

    /// Get a reference to the underlying client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Consume the executor and return the underlying client
    pub fn into_client(self) -> Client {
        self.client
    }

    /// Check if the underlying connection is healthy
    ///
    /// Executes `SELECT 1+1` and verifies the answer.
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the health check query fails.
    pub fn check_health(&self) -> Result<bool, DbError> {
        crate::connection::check_connection_health(self)
    }

    fn run_control(&self, statement: &str) -> Result<(), DbError> {
        log::trace!("{statement}");
        self.client
            .execute(statement, &[])
            .map(|_| ())
            .map_err(DbError::from)
    }
}

impl SqlExecutor for PgExecutor {
    fn batch_execute(&self, sql: &str) -> Result<(), DbError> {
        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!("strata.batch_execute", bytes = sql.len()).entered();

        self.client.batch_execute(sql).map_err(DbError::from)
    }

    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, DbError> {
        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!("strata.execute", query = sql).entered();

        with_converted_params(params, |params| {
            self.client.execute(sql, params).map_err(DbError::from)
        })
    }

    fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>, DbError> {
        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!("strata.query", query = sql).entered();

        let rows = with_converted_params(params, |params| {
            self.client.query(sql, params).map_err(DbError::from)
        })?;
        rows.iter().map(decode_row).collect()
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction.get()
    }

    fn begin(&self) -> Result<(), DbError> {
        if self.in_transaction.get() {
            return Err(DbError::Transaction(
                "There is already an active transaction".to_string(),
            ));
        }
        self.run_control("BEGIN")?;
        self.in_transaction.set(true);
        Ok(())
    }

    fn commit(&self) -> Result<(), DbError> {
        if !self.in_transaction.get() {
            return Err(DbError::Transaction(
                "There is no active transaction to commit".to_string(),
            ));
        }
        // The transaction is over either way once COMMIT was sent
        self.in_transaction.set(false);
        self.run_control("COMMIT")
    }

    fn rollback(&self) -> Result<(), DbError> {
        if !self.in_transaction.get() {
            return Err(DbError::Transaction(
                "There is no active transaction to roll back".to_string(),
            ));
        }
        self.in_transaction.set(false);
        self.run_control("ROLLBACK")
    }
}
