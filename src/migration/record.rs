//! `AppliedRecord` - rows of the bookkeeping table

use crate::executor::DbError;
use crate::migration::version::Version;
use crate::value::SqlRow;
use chrono::NaiveDateTime;
use serde::Serialize;

/// One applied migration as recorded in the bookkeeping table
///
/// `(version, name)` is the table's primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedRecord {
    pub version: Version,
    pub name: String,
    /// When the migration was applied (UTC)
    pub applied_at: NaiveDateTime,
}

impl AppliedRecord {
    #[must_use]
    pub fn new(version: Version, name: impl Into<String>, applied_at: NaiveDateTime) -> Self {
        Self {
            version,
            name: name.into(),
            applied_at,
        }
    }

    /// Build a record from a `"version", "name", "applied"` row
    ///
    /// # Errors
    ///
    /// Returns `DbError::Parse` if a column is missing or holds an unexpected value.
    pub fn from_row(row: &SqlRow) -> Result<Self, DbError> {
        let raw_version = row
            .get("version")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| DbError::Parse("missing or non-integer column `version`".to_string()))?;
        let version = Version::from_stored(raw_version)
            .ok_or_else(|| DbError::Parse(format!("stored version {raw_version} is out of range")))?;

        let name = row
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| DbError::Parse("missing or non-text column `name`".to_string()))?;

        let applied_at = row
            .get("applied")
            .and_then(|v| v.as_timestamp())
            .ok_or_else(|| DbError::Parse("missing or non-timestamp column `applied`".to_string()))?;

        Ok(Self::new(version, name, applied_at))
    }
}
