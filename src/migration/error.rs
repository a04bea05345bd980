//! Migration-specific error types

use crate::executor::DbError;
use crate::migration::version::Version;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Migration-specific errors
///
/// Every engine failure is one of these variants. Database failures are
/// passed through untouched in [`MigrationError::Database`] so callers see
/// the driver's own diagnostic.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Migrations root missing or not a directory
    #[error("The path `{}` does not exist or is not a directory", path.display())]
    InvalidPath { path: PathBuf },

    /// Version string is not exactly four ASCII digits
    #[error("Version number should be a string of 4 digits, example: 0001 (got `{version}`)")]
    InvalidVersionFormat { version: String },

    /// No folder for the requested version
    #[error("Version number {version} does not exist, or is not a folder")]
    NoSuchVersion { version: String },

    /// Version folder holds no `.sql` file
    #[error("The folder for version number {version} is empty and cannot be applied")]
    EmptyVersionFolder { version: String },

    /// A folder under the root is not named like a version
    #[error("Folder structure for version should be 4 digits, example: 0001 (found `{folder}`)")]
    BadFolderStructure { folder: String },

    /// The root holds no migration at all
    #[error("No migration files present in `{}`", root.display())]
    EmptyMigrationSet { root: PathBuf },

    /// Migration file missing on disk
    #[error("File `{}` does not exist and cannot be imported", path.display())]
    MissingFile { path: PathBuf },

    /// Migration file empty once trimmed
    #[error("SQL file is empty: `{}`", path.display())]
    EmptyFile { path: PathBuf },

    /// Attempt to downgrade an always-run file
    #[error("Version 0000 cannot be used with downgrades (file `{name}`)")]
    InvalidDowngradeTarget { name: String },

    /// Downgrade requested for a migration that was never applied
    #[error("Migration {version}-{name} is not applied")]
    NotApplied { version: Version, name: String },

    /// Apply requested for a migration that is already applied
    #[error("Migration {version}-{name} is already applied")]
    AlreadyApplied { version: Version, name: String },

    /// Filesystem failure while scanning or reading
    #[error("Failed to read `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Underlying database failure, unchanged
    #[error(transparent)]
    Database(#[from] DbError),
}

impl MigrationError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        MigrationError::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable name of the error kind, used in diagnostic traces
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            MigrationError::InvalidPath { .. } => "InvalidPath",
            MigrationError::InvalidVersionFormat { .. } => "InvalidVersionFormat",
            MigrationError::NoSuchVersion { .. } => "NoSuchVersion",
            MigrationError::EmptyVersionFolder { .. } => "EmptyVersionFolder",
            MigrationError::BadFolderStructure { .. } => "BadFolderStructure",
            MigrationError::EmptyMigrationSet { .. } => "EmptyMigrationSet",
            MigrationError::MissingFile { .. } => "MissingFile",
            MigrationError::EmptyFile { .. } => "EmptyFile",
            MigrationError::InvalidDowngradeTarget { .. } => "InvalidDowngradeTarget",
            MigrationError::NotApplied { .. } => "NotApplied",
            MigrationError::AlreadyApplied { .. } => "AlreadyApplied",
            MigrationError::Io { .. } => "Io",
            MigrationError::Database(_) => "Database",
        }
    }

    /// Failures the downgrade phase absorbs by dropping the orphaned record
    #[must_use]
    pub fn is_recoverable_downgrade(&self) -> bool {
        matches!(
            self,
            MigrationError::MissingFile { .. } | MigrationError::EmptyFile { .. }
        )
    }

    /// Failures the apply phase absorbs by skipping the file
    #[must_use]
    pub fn is_recoverable_apply(&self) -> bool {
        matches!(self, MigrationError::AlreadyApplied { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_error_is_transparent() {
        let err = MigrationError::from(DbError::Query("syntax error at or near \"SELEC\"".to_string()));
        assert_eq!(err.to_string(), "Query error: syntax error at or near \"SELEC\"");
        assert_eq!(err.code(), "Database");
    }

    #[test]
    fn test_recovery_policy() {
        let missing = MigrationError::MissingFile {
            path: PathBuf::from("/m/0002/a-down.sql"),
        };
        let empty = MigrationError::EmptyFile {
            path: PathBuf::from("/m/0002/a-down.sql"),
        };
        let applied = MigrationError::AlreadyApplied {
            version: Version::new(2).unwrap(),
            name: "a".to_string(),
        };
        let not_applied = MigrationError::NotApplied {
            version: Version::new(2).unwrap(),
            name: "a".to_string(),
        };

        assert!(missing.is_recoverable_downgrade());
        assert!(empty.is_recoverable_downgrade());
        assert!(!applied.is_recoverable_downgrade());
        assert!(!not_applied.is_recoverable_downgrade());

        assert!(applied.is_recoverable_apply());
        assert!(!missing.is_recoverable_apply());
        assert!(!empty.is_recoverable_apply());
    }

    #[test]
    fn test_messages_name_the_migration() {
        let err = MigrationError::AlreadyApplied {
            version: Version::new(3).unwrap(),
            name: "new_table".to_string(),
        };
        assert_eq!(err.to_string(), "Migration 0003-new_table is already applied");
        assert_eq!(err.code(), "AlreadyApplied");
    }
}
