//! # Strata
//!
//! Versioned, folder-based SQL migrations for PostgreSQL on the `may` runtime.
//!
//! Migrations live in `<root>/<VVVV>/<name>.sql` with an optional
//! `<name>-down.sql` reversal; applied state is kept in a bookkeeping table.
//! See [`migration`] for the layout and [`migration::Migrator`] for the engine.

pub mod config;
pub mod connection;
pub mod executor;
pub mod migration;
pub mod progress;
pub mod raw_sql;
pub mod transaction;
pub mod value;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use config::MigrationConfig;
pub use connection::{connect, connect_executor, ConnectionError, Credentials};
pub use executor::{DbError, PgExecutor, SqlExecutor};
pub use migration::{MigrationError, MigrationStatus, Migrator, RunSummary, Version};
pub use progress::{ColoredProgress, LogProgress, PlainProgress, Progress, SilentProgress, Style};
pub use transaction::{Ownership, TransactionScope};
pub use value::{SqlRow, SqlValue};
