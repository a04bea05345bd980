//! Migration status tracking

use crate::migration::file::StructureMap;
use crate::migration::record::AppliedRecord;
use crate::migration::version::Version;
use serde::Serialize;
use std::collections::BTreeSet;

/// A discovered migration without an applied record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingMigration {
    pub version: Version,
    pub name: String,
}

/// Migration status information
#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatus {
    /// Applied migrations (from the bookkeeping table), ascending
    pub applied: Vec<AppliedRecord>,

    /// Discovered, not yet applied migrations, ascending
    pub pending: Vec<PendingMigration>,

    /// Records whose up-file is no longer on disk
    pub orphaned: Vec<AppliedRecord>,

    /// Names of the `0000` files run on every run
    pub always_run: Vec<String>,
}

impl MigrationStatus {
    /// Compare the discovered structure with the applied records
    #[must_use]
    pub fn new(structure: &StructureMap, applied: Vec<AppliedRecord>) -> Self {
        let recorded: BTreeSet<(Version, &str)> = applied
            .iter()
            .map(|record| (record.version, record.name.as_str()))
            .collect();

        let pending = structure
            .iter()
            .filter(|(version, _)| !version.is_always_run())
            .flat_map(|(version, names)| {
                names.iter().map(move |name| PendingMigration {
                    version,
                    name: name.clone(),
                })
            })
            .filter(|p| !recorded.contains(&(p.version, p.name.as_str())))
            .collect();

        let orphaned = applied
            .iter()
            .filter(|record| !structure.contains(record.version, &record.name))
            .cloned()
            .collect();

        Self {
            always_run: structure.always_run().to_vec(),
            applied,
            pending,
            orphaned,
        }
    }

    /// Check if all migrations are applied
    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }

    #[must_use]
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Get the latest applied migration version
    #[must_use]
    pub fn latest_applied_version(&self) -> Option<Version> {
        self.applied.iter().map(|m| m.version).max()
    }

    /// Get the next pending migration version
    #[must_use]
    pub fn next_pending_version(&self) -> Option<Version> {
        self.pending.first().map(|m| m.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::file::StructureScanner;
    use crate::migration::root::MigrationRoot;
    use chrono::NaiveDate;
    use std::fs;
    use tempfile::TempDir;

    fn structure(files: &[&str]) -> (TempDir, StructureMap) {
        let dir = TempDir::new().unwrap();
        for relative in files {
            let path = dir.path().join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "SELECT 1;").unwrap();
        }
        let root = MigrationRoot::new(dir.path()).unwrap();
        let map = StructureScanner::new(&root).scan().unwrap();
        (dir, map)
    }

    fn record(version: u16, name: &str) -> AppliedRecord {
        let at = NaiveDate::from_ymd_opt(2024, 1, 20)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        AppliedRecord::new(Version::new(version).unwrap(), name, at)
    }

    #[test]
    fn test_pending_excludes_applied_and_always_run() {
        let (_dir, map) = structure(&["0000/seed.sql", "0001/test.sql", "0002/2test.sql", "0002/3test.sql"]);

        let status = MigrationStatus::new(&map, vec![record(1, "test"), record(2, "2test")]);

        assert_eq!(
            status.pending,
            vec![PendingMigration {
                version: Version::new(2).unwrap(),
                name: "3test".to_string(),
            }]
        );
        assert_eq!(status.always_run, vec!["seed".to_string()]);
        assert!(!status.is_up_to_date());
        assert_eq!(status.latest_applied_version(), Version::new(2));
        assert_eq!(status.next_pending_version(), Version::new(2));
        assert_eq!(status.applied_count(), 2);
        assert_eq!(status.pending_count(), 1);
    }

    #[test]
    fn test_up_to_date_and_orphans() {
        let (_dir, map) = structure(&["0001/test.sql"]);

        let status = MigrationStatus::new(&map, vec![record(1, "test"), record(3, "gone")]);

        assert!(status.is_up_to_date());
        assert_eq!(status.next_pending_version(), None);
        assert_eq!(status.orphaned, vec![record(3, "gone")]);
        assert_eq!(status.latest_applied_version(), Version::new(3));
    }
}
