//! Version numbers and their validation

use crate::migration::root::{sql_files, MigrationRoot};
use crate::migration::MigrationError;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

fn version_pattern() -> Result<&'static Regex, regex::Error> {
    static PATTERN: OnceCell<Regex> = OnceCell::new();
    PATTERN.get_or_try_init(|| Regex::new(r"^[0-9]{4}$"))
}

/// A four digit migration version (`0001` .. `9999`, plus the reserved `0000`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(u16);

impl Version {
    /// Reserved version whose files run on every run and are never recorded
    pub const ALWAYS_RUN: Version = Version(0);

    /// Largest representable version
    pub const MAX: Version = Version(9999);

    /// Version from its number, `None` above `9999`
    #[must_use]
    pub fn new(number: u16) -> Option<Self> {
        (number <= Self::MAX.0).then_some(Version(number))
    }

    /// Parse a folder name or command-line argument
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::InvalidVersionFormat` unless `s` is exactly four ASCII digits.
    pub fn parse(s: &str) -> Result<Self, MigrationError> {
        let pattern = version_pattern().map_err(|e| MigrationError::InvalidVersionFormat {
            version: format!("{s} ({e})"),
        })?;
        if !pattern.is_match(s) {
            return Err(MigrationError::InvalidVersionFormat {
                version: s.to_string(),
            });
        }
        s.parse::<u16>()
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| MigrationError::InvalidVersionFormat {
                version: s.to_string(),
            })
    }

    /// Version as stored in the bookkeeping table's `int2` column
    ///
    /// Returns `None` for values outside `0..=9999`.
    #[must_use]
    pub fn from_stored(value: i64) -> Option<Self> {
        u16::try_from(value).ok().and_then(Self::new)
    }

    #[must_use]
    pub fn number(self) -> u16 {
        self.0
    }

    /// Value bound to the `int2` column
    #[must_use]
    pub fn as_i16(self) -> i16 {
        i16::try_from(self.0).unwrap_or(i16::MAX)
    }

    #[must_use]
    pub fn is_always_run(self) -> bool {
        self == Self::ALWAYS_RUN
    }

    /// Zero-pad a numeric version to four digits
    ///
    /// ```
    /// assert_eq!(strata::migration::Version::pad(7), "0007");
    /// ```
    #[must_use]
    pub fn pad(number: u16) -> String {
        format!("{number:04}")
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

impl FromStr for Version {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Checks a version string against a migrations root
///
/// Pure validation: nothing is created or cached.
pub struct VersionValidator<'a> {
    root: &'a MigrationRoot,
}

impl<'a> VersionValidator<'a> {
    pub fn new(root: &'a MigrationRoot) -> Self {
        Self { root }
    }

    /// Validate `version` and return it parsed
    ///
    /// # Errors
    ///
    /// - `InvalidVersionFormat` if `version` is not four digits
    /// - `NoSuchVersion` if `<root>/<version>/` is missing or not a directory
    /// - `EmptyVersionFolder` if that folder holds no `.sql` file
    /// - `Io` if the folder cannot be listed
    pub fn validate(&self, version: &str) -> Result<Version, MigrationError> {
        let parsed = Version::parse(version)?;

        let dir = self.root.version_dir(parsed);
        if !dir.is_dir() {
            return Err(MigrationError::NoSuchVersion {
                version: version.to_string(),
            });
        }

        if sql_files(&dir)?.is_empty() {
            return Err(MigrationError::EmptyVersionFolder {
                version: version.to_string(),
            });
        }

        Ok(parsed)
    }
}
