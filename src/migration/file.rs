//! Migration file discovery

use crate::migration::root::{is_hidden, sql_files, MigrationRoot};
use crate::migration::version::{Version, VersionValidator};
use crate::migration::MigrationError;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::PathBuf;

/// File name marker of a reversal file (`<name>-down.sql`)
pub const DOWN_SUFFIX: &str = "-down";

/// Which variant of a migration to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// File name suffix before `.sql`
    #[must_use]
    pub fn suffix(self) -> &'static str {
        match self {
            Direction::Up => "",
            Direction::Down => DOWN_SUFFIX,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Up => "up",
            Direction::Down => "down",
        })
    }
}

/// A migration identified by `(version, name)` plus the variant to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    pub version: Version,
    pub name: String,
    pub direction: Direction,
}

impl MigrationFile {
    pub fn new(version: Version, name: impl Into<String>, direction: Direction) -> Self {
        Self {
            version,
            name: name.into(),
            direction,
        }
    }

    pub fn up(version: Version, name: impl Into<String>) -> Self {
        Self::new(version, name, Direction::Up)
    }

    pub fn down(version: Version, name: impl Into<String>) -> Self {
        Self::new(version, name, Direction::Down)
    }

    #[must_use]
    pub fn path(&self, root: &MigrationRoot) -> PathBuf {
        root.file_path(self.version, &self.name, self.direction)
    }
}

impl fmt::Display for MigrationFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.version, self.name)
    }
}

/// Discovered versions in ascending order, each with its sorted up-file names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructureMap {
    versions: BTreeMap<Version, Vec<String>>,
}

impl StructureMap {
    fn push(&mut self, version: Version, name: String) {
        self.versions.entry(version).or_default().push(name);
    }

    fn sort_names(&mut self) {
        for names in self.versions.values_mut() {
            names.sort();
        }
    }

    /// `(version, names)` pairs in ascending version order
    pub fn iter(&self) -> impl Iterator<Item = (Version, &[String])> {
        self.versions
            .iter()
            .map(|(version, names)| (*version, names.as_slice()))
    }

    pub fn versions(&self) -> impl Iterator<Item = Version> + '_ {
        self.versions.keys().copied()
    }

    #[must_use]
    pub fn names(&self, version: Version) -> Option<&[String]> {
        self.versions.get(&version).map(Vec::as_slice)
    }

    #[must_use]
    pub fn contains(&self, version: Version, name: &str) -> bool {
        self.names(version)
            .is_some_and(|names| names.iter().any(|n| n == name))
    }

    /// Names under `0000`
    #[must_use]
    pub fn always_run(&self) -> &[String] {
        self.names(Version::ALWAYS_RUN).unwrap_or_default()
    }

    /// Number of files across all versions
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.versions.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

impl<'a> IntoIterator for &'a StructureMap {
    type Item = (Version, &'a [String]);
    type IntoIter = Box<dyn Iterator<Item = Self::Item> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

/// Walks a migrations root and builds its [`StructureMap`]
///
/// Only `*.sql` files exactly two levels down (`<root>/<VVVV>/<name>.sql`)
/// are considered. Hidden entries are ignored.
pub struct StructureScanner<'a> {
    root: &'a MigrationRoot,
}

impl<'a> StructureScanner<'a> {
    pub fn new(root: &'a MigrationRoot) -> Self {
        Self { root }
    }

    /// Scan the root
    ///
    /// Files under `0000` are accepted as they are. Every other folder that
    /// holds `.sql` files must be named like a version, and `-down` files are
    /// left out of the map.
    ///
    /// # Errors
    ///
    /// - `BadFolderStructure` if a folder holding `.sql` files is not named `VVVV`
    /// - `EmptyMigrationSet` if no up-file was found at all
    /// - `Io` if a directory cannot be listed
    pub fn scan(&self) -> Result<StructureMap, MigrationError> {
        let root = self.root.path();
        let entries = fs::read_dir(root).map_err(|e| MigrationError::io(root, e))?;

        let mut folders = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| MigrationError::io(root, e))?.path();
            if path.is_dir() && !is_hidden(&path) {
                folders.push(path);
            }
        }
        folders.sort();

        let validator = VersionValidator::new(self.root);
        let mut structure = StructureMap::default();

        for folder in folders {
            let files = sql_files(&folder)?;
            if files.is_empty() {
                continue;
            }

            let folder_name = folder
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let version = if folder_name == Version::ALWAYS_RUN.to_string() {
                Version::ALWAYS_RUN
            } else {
                match validator.validate(&folder_name) {
                    Ok(version) => version,
                    Err(MigrationError::InvalidVersionFormat { .. }) => {
                        return Err(MigrationError::BadFolderStructure {
                            folder: folder_name,
                        })
                    }
                    Err(e) => return Err(e),
                }
            };

            for file in files {
                let Some(name) = file.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                    continue;
                };
                if !version.is_always_run() && name.ends_with(DOWN_SUFFIX) {
                    continue;
                }
                structure.push(version, name);
            }
        }

        if structure.is_empty() {
            return Err(MigrationError::EmptyMigrationSet {
                root: root.to_path_buf(),
            });
        }

        structure.sort_names();
        log::debug!(
            "Discovered {} migration file(s) in {} version(s) under {}",
            structure.file_count(),
            structure.len(),
            self.root
        );
        Ok(structure)
    }
}
