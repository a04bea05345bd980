//! Bookkeeping table management

use crate::executor::{DbError, SqlExecutor};
use crate::migration::record::AppliedRecord;
use crate::migration::version::Version;
use crate::value::{SqlRow, SqlValue};
use chrono::NaiveDateTime;

/// Default bookkeeping table name
pub const DEFAULT_TABLE_NAME: &str = "migration";

/// Quote an identifier for PostgreSQL, doubling embedded quotes
#[must_use]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// DDL of the bookkeeping table
#[must_use]
pub fn create_state_table_sql(table: &str) -> String {
    format!(
        r#"CREATE TABLE IF NOT EXISTS {} (
            "version" int2 NOT NULL,
            "name" VARCHAR(255) NOT NULL,
            "applied" TIMESTAMP NOT NULL,
            PRIMARY KEY ("version", "name")
        )"#,
        quote_ident(table)
    )
}

/// Initialize the bookkeeping table
///
/// Creates it if it does not exist; an existing table is left alone.
///
/// # Errors
///
/// Returns the executor's error if the DDL fails.
pub fn initialize_state_table<E: SqlExecutor + ?Sized>(executor: &E, table: &str) -> Result<(), DbError> {
    executor.execute(&create_state_table_sql(table), &[])?;
    Ok(())
}

/// Versions scheduled for downgrade, highest first, each with its names
/// in descending order
pub type DowngradeSet = Vec<(Version, Vec<String>)>;

/// Reads and writes applied state in the bookkeeping table
pub struct AppliedStateTracker<'a, E: SqlExecutor + ?Sized> {
    executor: &'a E,
    table: String,
}

impl<'a, E: SqlExecutor + ?Sized> AppliedStateTracker<'a, E> {
    pub fn new(executor: &'a E, table_name: &str) -> Self {
        Self {
            executor,
            table: quote_ident(table_name),
        }
    }

    /// Whether `(version, name)` has a record
    ///
    /// # Errors
    ///
    /// Returns the executor's error if the query fails.
    pub fn is_applied(&self, version: Version, name: &str) -> Result<bool, DbError> {
        let sql = format!(
            r#"SELECT COUNT(1) FROM {} WHERE "version" = $1 AND "name" = $2"#,
            self.table
        );
        let rows = self
            .executor
            .query(&sql, &[SqlValue::SmallInt(version.as_i16()), SqlValue::from(name)])?;
        Ok(first_count(&rows)? > 0)
    }

    /// Insert a record
    ///
    /// Violates the primary key if the migration is already recorded;
    /// callers check [`is_applied`](Self::is_applied) first.
    ///
    /// # Errors
    ///
    /// Returns the executor's error if the insert fails.
    pub fn record_applied(&self, version: Version, name: &str, applied_at: NaiveDateTime) -> Result<(), DbError> {
        let sql = format!(
            r#"INSERT INTO {} ("version", "name", "applied") VALUES ($1, $2, $3)"#,
            self.table
        );
        self.executor.execute(
            &sql,
            &[
                SqlValue::SmallInt(version.as_i16()),
                SqlValue::from(name),
                SqlValue::Timestamp(applied_at),
            ],
        )?;
        Ok(())
    }

    /// Delete the record of `(version, name)`, returning whether one existed
    ///
    /// # Errors
    ///
    /// Returns the executor's error if the delete fails.
    pub fn record_reverted(&self, version: Version, name: &str) -> Result<bool, DbError> {
        let sql = format!(
            r#"DELETE FROM {} WHERE "version" = $1 AND "name" = $2"#,
            self.table
        );
        let affected = self
            .executor
            .execute(&sql, &[SqlValue::SmallInt(version.as_i16()), SqlValue::from(name)])?;
        Ok(affected > 0)
    }

    /// Every record with a version above `target`
    ///
    /// Ordered by version descending, then name descending, so the newest
    /// objects are torn down first.
    ///
    /// # Errors
    ///
    /// Returns the executor's error if the query fails or a row cannot be decoded.
    pub fn pending_downgrades(&self, target: Version) -> Result<DowngradeSet, DbError> {
        let sql = format!(
            r#"SELECT "version", "name", "applied" FROM {} WHERE "version" > $1 ORDER BY "version" DESC, "name" DESC"#,
            self.table
        );
        let rows = self
            .executor
            .query(&sql, &[SqlValue::SmallInt(target.as_i16())])?;

        let mut set: DowngradeSet = Vec::new();
        for row in &rows {
            let record = AppliedRecord::from_row(row)?;
            match set.last_mut() {
                Some((version, names)) if *version == record.version => names.push(record.name),
                _ => set.push((record.version, vec![record.name])),
            }
        }
        Ok(set)
    }

    /// All records, ascending by version then name
    ///
    /// # Errors
    ///
    /// Returns the executor's error if the query fails or a row cannot be decoded.
    pub fn applied_records(&self) -> Result<Vec<AppliedRecord>, DbError> {
        let sql = format!(
            r#"SELECT "version", "name", "applied" FROM {} ORDER BY "version" ASC, "name" ASC"#,
            self.table
        );
        self.executor
            .query(&sql, &[])?
            .iter()
            .map(AppliedRecord::from_row)
            .collect()
    }

    /// Number of records, optionally only those applied at or after `since`
    ///
    /// # Errors
    ///
    /// Returns the executor's error if the query fails.
    pub fn count(&self, since: Option<NaiveDateTime>) -> Result<u64, DbError> {
        let rows = match since {
            Some(since) => {
                let sql = format!(r#"SELECT COUNT(1) FROM {} WHERE "applied" >= $1"#, self.table);
                self.executor.query(&sql, &[SqlValue::Timestamp(since)])?
            }
            None => {
                let sql = format!("SELECT COUNT(1) FROM {}", self.table);
                self.executor.query(&sql, &[])?
            }
        };
        first_count(&rows)
    }
}

fn first_count(rows: &[SqlRow]) -> Result<u64, DbError> {
    rows.first()
        .and_then(|row| row.get_index(0))
        .and_then(|v| v.as_i64())
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| DbError::Parse("COUNT query returned no integer".to_string()))
}
