//! Single-file migration step
//!
//! [`MigrationExecutor`] applies or reverts one `(version, name)` pair:
//!
//! 1. `0000` files cannot be downgraded
//! 2. the `<name>.sql` / `<name>-down.sql` file must exist
//! 3. the bookkeeping table decides whether the step is allowed at all
//! 4. a transaction is opened unless an outer caller already holds one
//! 5. the trimmed file content must not be empty
//! 6. the SQL runs as one batch; a failure is rolled back
//! 7. the record is inserted (up, never for `0000`) or deleted (down)
//! 8. the transaction is committed if this step opened it
//!
//! Database errors from any of these are reported as an `ERROR` outcome.

use crate::executor::SqlExecutor;
use crate::migration::file::{Direction, MigrationFile};
use crate::migration::root::MigrationRoot;
use crate::migration::state_table::AppliedStateTracker;
use crate::migration::version::Version;
use crate::migration::MigrationError;
use crate::progress::{Progress, Style};
use crate::transaction::TransactionScope;
use chrono::Utc;
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

/// What a successful step did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Up file ran and was recorded
    Migrated,
    /// Down file ran and the record was removed
    Downgraded,
    /// `0000` file ran; nothing recorded
    AlwaysRun,
}

impl StepOutcome {
    /// Status shown next to the file's progress line
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            StepOutcome::Migrated | StepOutcome::AlwaysRun => "MIGRATED",
            StepOutcome::Downgraded => "DOWNGRADED",
        }
    }
}

/// Read a SQL file and trim it
///
/// # Errors
///
/// - `MissingFile` if `path` does not exist
/// - `EmptyFile` if nothing but whitespace is left after trimming
/// - `Io` for any other read failure
pub fn read_sql_file(path: &Path) -> Result<String, MigrationError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(MigrationError::MissingFile {
                path: path.to_path_buf(),
            })
        }
        Err(e) => return Err(MigrationError::io(path, e)),
    };

    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(MigrationError::EmptyFile {
            path: path.to_path_buf(),
        });
    }
    Ok(trimmed.to_string())
}

/// Run an arbitrary SQL file as one batch, without bookkeeping
///
/// # Errors
///
/// Returns the errors of [`read_sql_file`], or the database error unchanged.
pub fn import_sql_file<E: SqlExecutor + ?Sized>(executor: &E, path: &Path) -> Result<(), MigrationError> {
    let sql = read_sql_file(path)?;
    executor.batch_execute(&sql)?;
    Ok(())
}

/// Applies or reverts single migration files
pub struct MigrationExecutor<'a, E: SqlExecutor + ?Sized, P: Progress + ?Sized> {
    executor: &'a E,
    progress: &'a P,
    root: &'a MigrationRoot,
    table_name: &'a str,
    step_delay: Duration,
}

impl<'a, E: SqlExecutor + ?Sized, P: Progress + ?Sized> MigrationExecutor<'a, E, P> {
    pub fn new(executor: &'a E, progress: &'a P, root: &'a MigrationRoot, table_name: &'a str) -> Self {
        Self {
            executor,
            progress,
            root,
            table_name,
            step_delay: Duration::ZERO,
        }
    }

    /// Pause before each file is executed
    #[must_use]
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    /// Apply `<version>/<name>.sql`
    ///
    /// # Errors
    ///
    /// See [`run_file`](Self::run_file).
    pub fn apply(&self, version: Version, name: &str) -> Result<StepOutcome, MigrationError> {
        self.run_file(&MigrationFile::up(version, name))
    }

    /// Revert `<version>/<name>` by running `<name>-down.sql`
    ///
    /// # Errors
    ///
    /// See [`run_file`](Self::run_file).
    pub fn downgrade(&self, version: Version, name: &str) -> Result<StepOutcome, MigrationError> {
        self.run_file(&MigrationFile::down(version, name))
    }

    /// Run one migration file
    ///
    /// # Errors
    ///
    /// - `InvalidDowngradeTarget` for a `0000` downgrade
    /// - `MissingFile` / `EmptyFile` for an absent or blank file
    /// - `NotApplied` / `AlreadyApplied` when the bookkeeping table forbids the step
    /// - `Database` with the driver error when the SQL or the bookkeeping fails
    pub fn run_file(&self, file: &MigrationFile) -> Result<StepOutcome, MigrationError> {
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!(
            "strata.step",
            version = %file.version,
            name = %file.name,
            direction = %file.direction
        )
        .entered();

        if file.version.is_always_run() && file.direction == Direction::Down {
            return Err(MigrationError::InvalidDowngradeTarget {
                name: file.name.clone(),
            });
        }

        let verb = match file.direction {
            Direction::Up => "Migrating",
            Direction::Down => "Downgrading",
        };
        self.progress
            .announce(&format!(" - {verb} file {}…", file.name), Style::Plain);

        match self.execute(file, verb) {
            Ok(outcome) => {
                self.progress.update_previous(outcome.label(), Style::Success);
                log::info!("{file}: {}", outcome.label());
                Ok(outcome)
            }
            Err(MigrationError::Database(e)) => {
                self.progress.update_previous("ERROR", Style::Failure);
                self.progress
                    .announce(&format!(" - Database error: {e}"), Style::Failure);
                log::error!("{file} failed: {e}");
                Err(MigrationError::Database(e))
            }
            Err(e) => Err(e),
        }
    }

    fn execute(&self, file: &MigrationFile, verb: &str) -> Result<StepOutcome, MigrationError> {
        let path = file.path(self.root);
        if !path.is_file() {
            return Err(MigrationError::MissingFile { path });
        }

        log::debug!("{verb} {file} from {}", path.display());
        if !self.step_delay.is_zero() {
            may::coroutine::sleep(self.step_delay);
        }

        let tracker = AppliedStateTracker::new(self.executor, self.table_name);
        let applied = tracker.is_applied(file.version, &file.name)?;
        match file.direction {
            Direction::Down if !applied => {
                return Err(MigrationError::NotApplied {
                    version: file.version,
                    name: file.name.clone(),
                })
            }
            Direction::Up if applied => {
                return Err(MigrationError::AlreadyApplied {
                    version: file.version,
                    name: file.name.clone(),
                })
            }
            _ => {}
        }

        let scope = TransactionScope::enter(self.executor)?;
        scope.run(|| {
            let sql = read_sql_file(&path)?;
            self.executor.batch_execute(&sql)?;

            match file.direction {
                Direction::Down => {
                    tracker.record_reverted(file.version, &file.name)?;
                    Ok(StepOutcome::Downgraded)
                }
                Direction::Up if file.version.is_always_run() => Ok(StepOutcome::AlwaysRun),
                Direction::Up => {
                    tracker.record_applied(file.version, &file.name, Utc::now().naive_utc())?;
                    Ok(StepOutcome::Migrated)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::DbError;
    use crate::migration::state_table::{initialize_state_table, DEFAULT_TABLE_NAME};
    use crate::test_helpers::{MockExecutor, ProgressEvent, RecordingProgress};
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        root: MigrationRoot,
        executor: MockExecutor,
        progress: RecordingProgress,
    }

    impl Fixture {
        fn new(files: &[(&str, &str)]) -> Self {
            let dir = TempDir::new().unwrap();
            for (relative, content) in files {
                let path = dir.path().join(relative);
                fs::create_dir_all(path.parent().unwrap()).unwrap();
                fs::write(path, content).unwrap();
            }
            let root = MigrationRoot::new(dir.path()).unwrap();
            let executor = MockExecutor::new();
            initialize_state_table(&executor, DEFAULT_TABLE_NAME).unwrap();
            Self {
                dir,
                root,
                executor,
                progress: RecordingProgress::new(),
            }
        }

        fn step(&self) -> MigrationExecutor<'_, MockExecutor, RecordingProgress> {
            MigrationExecutor::new(&self.executor, &self.progress, &self.root, DEFAULT_TABLE_NAME)
        }
    }

    fn v(n: u16) -> Version {
        Version::new(n).unwrap()
    }

    const TEST_UP: (&str, &str) = ("0001/test.sql", "CREATE TABLE test (id int);");
    const TEST_DOWN: (&str, &str) = ("0001/test-down.sql", "DROP TABLE test;");

    #[test]
    fn test_apply_runs_sql_and_records() {
        let fx = Fixture::new(&[TEST_UP]);

        let outcome = fx.step().apply(v(1), "test").unwrap();

        assert_eq!(outcome, StepOutcome::Migrated);
        assert!(fx.executor.has_table("test"));
        assert_eq!(fx.executor.applied(DEFAULT_TABLE_NAME), vec![(1, "test".to_string())]);
        assert_eq!(fx.executor.commit_count(), 1);
        assert_eq!(
            fx.progress.events(),
            vec![
                ProgressEvent::Announce(" - Migrating file test…".to_string(), Style::Plain),
                ProgressEvent::Update("MIGRATED".to_string(), Style::Success),
            ]
        );
    }

    #[test]
    fn test_apply_twice_is_rejected_before_sql() {
        let fx = Fixture::new(&[TEST_UP]);
        fx.step().apply(v(1), "test").unwrap();

        let err = fx.step().apply(v(1), "test").unwrap_err();

        assert!(matches!(err, MigrationError::AlreadyApplied { .. }));
        assert_eq!(fx.executor.batches().len(), 1);
        assert_eq!(fx.executor.begin_count(), 1);
    }

    #[test]
    fn test_downgrade_requires_applied_record() {
        let fx = Fixture::new(&[TEST_UP, TEST_DOWN]);

        let err = fx.step().downgrade(v(1), "test").unwrap_err();

        assert!(matches!(err, MigrationError::NotApplied { .. }));
        assert!(fx.executor.batches().is_empty());
    }

    #[test]
    fn test_downgrade_runs_down_file_and_removes_record() {
        let fx = Fixture::new(&[TEST_UP, TEST_DOWN]);
        fx.step().apply(v(1), "test").unwrap();

        let outcome = fx.step().downgrade(v(1), "test").unwrap();

        assert_eq!(outcome, StepOutcome::Downgraded);
        assert!(!fx.executor.has_table("test"));
        assert!(fx.executor.applied(DEFAULT_TABLE_NAME).is_empty());
        assert_eq!(fx.progress.updates(), vec!["MIGRATED", "DOWNGRADED"]);
        assert_eq!(
            fx.progress.announcements(),
            vec![" - Migrating file test…", " - Downgrading file test…"]
        );
    }

    #[test]
    fn test_always_run_downgrade_is_rejected_up_front() {
        let fx = Fixture::new(&[("0000/seed.sql", "SELECT 1;"), ("0000/seed-down.sql", "SELECT 2;")]);

        let err = fx.step().downgrade(Version::ALWAYS_RUN, "seed").unwrap_err();

        assert!(matches!(err, MigrationError::InvalidDowngradeTarget { .. }));
        assert!(fx.progress.events().is_empty());
        assert!(fx.executor.batches().is_empty());
    }

    #[test]
    fn test_always_run_is_never_recorded() {
        let fx = Fixture::new(&[("0000/seed.sql", "CREATE TABLE IF NOT EXISTS seed (id int);")]);

        for _ in 0..3 {
            let outcome = fx.step().apply(Version::ALWAYS_RUN, "seed").unwrap();
            assert_eq!(outcome, StepOutcome::AlwaysRun);
        }

        assert_eq!(fx.executor.batches().len(), 3);
        assert!(fx.executor.applied(DEFAULT_TABLE_NAME).is_empty());
    }

    #[test]
    fn test_missing_file() {
        let fx = Fixture::new(&[TEST_UP]);

        let err = fx.step().downgrade(v(1), "test").unwrap_err();

        match err {
            MigrationError::MissingFile { path } => {
                assert_eq!(path, fx.dir.path().join("0001").join("test-down.sql"));
            }
            other => panic!("expected MissingFile, got {other:?}"),
        }
        assert_eq!(fx.executor.begin_count(), 0);
    }

    #[test]
    fn test_whitespace_only_file_is_empty() {
        let fx = Fixture::new(&[("0002/blank.sql", "  \n\t \n")]);

        let err = fx.step().apply(v(2), "blank").unwrap_err();

        assert!(matches!(err, MigrationError::EmptyFile { .. }));
        assert!(fx.executor.applied(DEFAULT_TABLE_NAME).is_empty());
        assert_eq!(fx.executor.rollback_count(), 1);
        assert!(!fx.executor.in_transaction());
    }

    #[test]
    fn test_sql_failure_reports_rolls_back_and_passes_error_through() {
        let fx = Fixture::new(&[("0001/broken.sql", "CREATE TABLE ok (id int); SELEC 1;")]);
        fx.executor.fail_on("SELEC 1");

        let err = fx.step().apply(v(1), "broken").unwrap_err();

        match &err {
            MigrationError::Database(DbError::Query(msg)) => assert!(msg.contains("SELEC 1")),
            other => panic!("expected database passthrough, got {other:?}"),
        }
        assert_eq!(fx.executor.rollback_count(), 1);
        assert!(fx.executor.applied(DEFAULT_TABLE_NAME).is_empty());
        assert_eq!(
            fx.progress.events()[1..],
            [
                ProgressEvent::Update("ERROR".to_string(), Style::Failure),
                ProgressEvent::Announce(format!(" - Database error: {}", DbError::Query("syntax error at or near \"SELEC 1\"".to_string())), Style::Failure),
            ]
        );
    }

    #[test]
    fn test_bookkeeping_failure_is_reported_and_rolled_back() {
        let fx = Fixture::new(&[TEST_UP]);
        fx.executor.fail_on("INSERT INTO");

        let err = fx.step().apply(v(1), "test").unwrap_err();

        assert!(matches!(err, MigrationError::Database(DbError::Query(_))));
        assert!(!fx.executor.has_table("test"));
        assert_eq!(fx.executor.rollback_count(), 1);
        assert_eq!(
            fx.progress.events(),
            vec![
                ProgressEvent::Announce(" - Migrating file test…".to_string(), Style::Plain),
                ProgressEvent::Update("ERROR".to_string(), Style::Failure),
                ProgressEvent::Announce(
                    format!(" - Database error: {}", DbError::Query("syntax error at or near \"INSERT INTO\"".to_string())),
                    Style::Failure
                ),
            ]
        );
    }

    #[test]
    fn test_failure_inside_ambient_transaction_leaves_boundary_alone() {
        let fx = Fixture::new(&[("0001/broken.sql", "SELEC 1;")]);
        fx.executor.fail_on("SELEC");
        fx.executor.begin().unwrap();

        assert!(fx.step().apply(v(1), "broken").is_err());

        assert!(fx.executor.in_transaction());
        assert_eq!(fx.executor.rollback_count(), 0);
        assert_eq!(fx.executor.begin_count(), 1);
    }

    #[test]
    fn test_import_sql_file_has_no_bookkeeping() {
        let fx = Fixture::new(&[("extra/seed.sql", "\n CREATE TABLE extra (id int); \n")]);

        import_sql_file(&fx.executor, &fx.dir.path().join("extra/seed.sql")).unwrap();

        assert!(fx.executor.has_table("extra"));
        assert_eq!(fx.executor.batches(), vec!["CREATE TABLE extra (id int);"]);
        assert!(fx.executor.applied(DEFAULT_TABLE_NAME).is_empty());
        assert!(matches!(
            import_sql_file(&fx.executor, &fx.dir.path().join("extra/none.sql")),
            Err(MigrationError::MissingFile { .. })
        ));
    }
}
