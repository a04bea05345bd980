//! Ownership-aware transaction scopes.
//!
//! A caller that wants its work to be atomic enters a [`TransactionScope`].
//! If no transaction is open yet, the scope begins one and *owns* it: its
//! `commit`/`rollback` end the transaction. If an outer caller already
//! opened one, the scope is *ambient*: it never begins, commits or rolls
//! back, leaving the boundary to whoever owns it.
//!
//! ```no_run
//! use strata::executor::SqlExecutor;
//! use strata::transaction::TransactionScope;
//!
//! # fn example(executor: &dyn SqlExecutor) -> Result<(), strata::DbError> {
//! let scope = TransactionScope::enter(executor)?;
//! match executor.batch_execute("CREATE TABLE users (id int)") {
//!     Ok(()) => scope.commit()?,
//!     Err(e) => {
//!         scope.rollback()?;
//!         return Err(e);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use crate::executor::{DbError, SqlExecutor};

/// Who owns the transaction boundary for a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// This scope began the transaction and must end it
    Owned,
    /// An outer caller's transaction was already open
    Ambient,
}

/// A transaction boundary entered by one caller
///
/// Dropping an owned scope without calling `commit` or `rollback` leaves the
/// transaction open; callers end it explicitly so failures propagate.
#[must_use = "a scope must be committed or rolled back"]
pub struct TransactionScope<'e, E: SqlExecutor + ?Sized> {
    executor: &'e E,
    ownership: Ownership,
}

impl<'e, E: SqlExecutor + ?Sized> TransactionScope<'e, E> {
    /// Enter a scope, beginning a transaction only if none is open
    ///
    /// # Errors
    ///
    /// Returns the executor's error if `BEGIN` fails.
    pub fn enter(executor: &'e E) -> Result<Self, DbError> {
        let ownership = if executor.in_transaction() {
            Ownership::Ambient
        } else {
            executor.begin()?;
            Ownership::Owned
        };
        log::trace!("Entered transaction scope ({ownership:?})");
        Ok(Self { executor, ownership })
    }

    /// Scope that never touches the transaction boundary
    pub fn ambient(executor: &'e E) -> Self {
        Self {
            executor,
            ownership: Ownership::Ambient,
        }
    }

    #[must_use]
    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    #[must_use]
    pub fn is_owned(&self) -> bool {
        self.ownership == Ownership::Owned
    }

    /// Commit if this scope owns the transaction
    ///
    /// # Errors
    ///
    /// Returns the executor's error if `COMMIT` fails.
    pub fn commit(self) -> Result<(), DbError> {
        match self.ownership {
            Ownership::Owned => self.executor.commit(),
            Ownership::Ambient => Ok(()),
        }
    }

    /// Roll back if this scope owns the transaction
    ///
    /// # Errors
    ///
    /// Returns the executor's error if `ROLLBACK` fails.
    pub fn rollback(self) -> Result<(), DbError> {
        match self.ownership {
            Ownership::Owned => self.executor.rollback(),
            Ownership::Ambient => Ok(()),
        }
    }

    /// Run `f` inside the scope: commit on `Ok`, roll back on `Err`
    ///
    /// A rollback failure is logged and the original error is returned.
    ///
    /// # Errors
    ///
    /// Returns `f`'s error, or the commit error converted into `X`.
    pub fn run<T, X, F>(self, f: F) -> Result<T, X>
    where
        F: FnOnce() -> Result<T, X>,
        X: From<DbError>,
    {
        match f() {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback() {
                    log::error!("Rollback failed: {rollback_err}");
                }
                Err(err)
            }
        }
    }
}
