//! Migrations root directory

use crate::migration::file::Direction;
use crate::migration::version::Version;
use crate::migration::MigrationError;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

/// Validated migrations root
///
/// All filesystem access of the engine goes through paths built here:
/// `<root>/<VVVV>/` for a version and `<root>/<VVVV>/<name>[-down].sql`
/// for a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRoot {
    path: PathBuf,
}

impl MigrationRoot {
    /// Resolve a migrations root
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::InvalidPath` if `path` does not exist or is not a directory.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, MigrationError> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(MigrationError::InvalidPath {
                path: path.to_path_buf(),
            });
        }
        Ok(Self {
            path: path.components().collect(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Root rendered with exactly one trailing separator
    #[must_use]
    pub fn normalized(&self) -> String {
        let rendered = self.path.to_string_lossy();
        let trimmed = rendered.trim_end_matches(MAIN_SEPARATOR);
        format!("{trimmed}{MAIN_SEPARATOR}")
    }

    #[must_use]
    pub fn version_dir(&self, version: Version) -> PathBuf {
        self.path.join(version.to_string())
    }

    /// Path of the up or down file of a migration
    #[must_use]
    pub fn file_path(&self, version: Version, name: &str, direction: Direction) -> PathBuf {
        self.version_dir(version)
            .join(format!("{name}{}.sql", direction.suffix()))
    }
}

impl fmt::Display for MigrationRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized())
    }
}

pub(crate) fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

/// Visible `*.sql` files directly inside `dir`, sorted by path
pub(crate) fn sql_files(dir: &Path) -> Result<Vec<PathBuf>, MigrationError> {
    let entries = fs::read_dir(dir).map_err(|e| MigrationError::io(dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| MigrationError::io(dir, e))?.path();
        if is_hidden(&path) || !path.is_file() {
            continue;
        }
        if path.extension().and_then(|s| s.to_str()) == Some("sql") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_new_rejects_missing_and_non_directory_paths() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("file.sql");
        fs::write(&file, "SELECT 1").unwrap();

        assert!(matches!(
            MigrationRoot::new(temp_dir.path().join("missing")),
            Err(MigrationError::InvalidPath { .. })
        ));
        assert!(matches!(
            MigrationRoot::new(&file),
            Err(MigrationError::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_trailing_separator_is_normalized() {
        let temp_dir = TempDir::new().unwrap();
        let with_slash = format!("{}{MAIN_SEPARATOR}{MAIN_SEPARATOR}", temp_dir.path().display());

        let a = MigrationRoot::new(temp_dir.path()).unwrap();
        let b = MigrationRoot::new(&with_slash).unwrap();

        assert_eq!(a, b);
        assert!(a.normalized().ends_with(MAIN_SEPARATOR));
        assert!(!a.normalized().ends_with(&format!("{MAIN_SEPARATOR}{MAIN_SEPARATOR}")));
    }

    #[test]
    fn test_file_paths() {
        let temp_dir = TempDir::new().unwrap();
        let root = MigrationRoot::new(temp_dir.path()).unwrap();
        let version = Version::new(2).unwrap();

        assert_eq!(
            root.file_path(version, "2test", Direction::Up),
            temp_dir.path().join("0002").join("2test.sql")
        );
        assert_eq!(
            root.file_path(version, "2test", Direction::Down),
            temp_dir.path().join("0002").join("2test-down.sql")
        );
    }

    #[test]
    fn test_sql_files_skips_hidden_and_other_extensions() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["b.sql", "a.sql", ".hidden.sql", "notes.md"] {
            fs::write(temp_dir.path().join(name), "SELECT 1").unwrap();
        }
        fs::create_dir(temp_dir.path().join("dir.sql")).unwrap();

        let names: Vec<String> = sql_files(temp_dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.sql", "b.sql"]);
    }
}
