//! Migrator - Core migration execution engine

use crate::config::MigrationConfig;
use crate::connection::{check_connection_health, connect_executor};
use crate::executor::{DbError, PgExecutor, SqlExecutor};
use crate::migration::file::{StructureMap, StructureScanner};
use crate::migration::root::MigrationRoot;
use crate::migration::state_table::{initialize_state_table, AppliedStateTracker, DowngradeSet};
use crate::migration::status::MigrationStatus;
use crate::migration::step::{import_sql_file, MigrationExecutor, StepOutcome};
use crate::migration::version::{Version, VersionValidator};
use crate::migration::MigrationError;
use crate::progress::{Progress, Style};
use crate::raw_sql;
use crate::transaction::TransactionScope;
use crate::value::{SqlRow, SqlValue};
use chrono::NaiveDateTime;
use once_cell::unsync::OnceCell;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

/// Counters of one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Up files executed and recorded
    pub applied: usize,
    /// Down files executed and unrecorded
    pub downgraded: usize,
    /// `0000` files executed
    pub always_run: usize,
    /// Files skipped because they were already applied
    pub skipped: usize,
    /// Records dropped because their down file was missing or empty
    pub orphans_removed: usize,
}

impl RunSummary {
    /// Whether the run changed any bookkeeping
    #[must_use]
    pub fn changed(&self) -> bool {
        self.applied > 0 || self.downgraded > 0 || self.orphans_removed > 0
    }
}

/// Core migration execution engine
///
/// Owns the executor and the progress sink. The directory structure is
/// scanned on first use and cached until the root changes.
pub struct Migrator<E: SqlExecutor, P: Progress> {
    executor: E,
    progress: P,
    root: MigrationRoot,
    table_name: String,
    use_transaction: bool,
    step_delay: Duration,
    structure: OnceCell<StructureMap>,
}

impl<P: Progress> Migrator<PgExecutor, P> {
    /// Connect with `config.database_url` and build a migrator on top
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Database` if the connection fails, plus
    /// everything [`Migrator::new`] can return.
    pub fn connect(config: &MigrationConfig, progress: P) -> Result<Self, MigrationError> {
        let executor = connect_executor(&config.database_url, &config.credentials()).map_err(DbError::from)?;
        Self::new(executor, progress, config)
    }
}

impl<E: SqlExecutor, P: Progress> Migrator<E, P> {
    /// Create a migrator
    ///
    /// Resolves the root, probes the connection and creates the
    /// bookkeeping table if it does not exist.
    ///
    /// # Errors
    ///
    /// - `InvalidPath` if `config.path` is not a directory
    /// - `Database` if the probe or the table creation fails
    pub fn new(executor: E, progress: P, config: &MigrationConfig) -> Result<Self, MigrationError> {
        let root = MigrationRoot::new(&config.path)?;
        let migrator = Self {
            executor,
            progress,
            root,
            table_name: config.table_name.clone(),
            use_transaction: config.use_transaction,
            step_delay: config.step_delay(),
            structure: OnceCell::new(),
        };

        if !migrator.check_status()? {
            return Err(DbError::Connection("Connection failed".to_string()).into());
        }
        migrator.create_state_table()?;
        Ok(migrator)
    }

    /// Whether the connection answers `SELECT 1+1` correctly
    ///
    /// # Errors
    ///
    /// Returns the database error if the probe cannot run.
    pub fn check_status(&self) -> Result<bool, DbError> {
        check_connection_health(&self.executor)
    }

    /// Point the engine at another root, dropping the cached structure
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::InvalidPath` if `path` is not a directory.
    pub fn set_path(&mut self, path: impl AsRef<Path>) -> Result<(), MigrationError> {
        self.root = MigrationRoot::new(path)?;
        self.structure = OnceCell::new();
        Ok(())
    }

    #[must_use]
    pub fn root(&self) -> &MigrationRoot {
        &self.root
    }

    /// Use another bookkeeping table from now on
    ///
    /// The table is not created; call [`create_state_table`](Self::create_state_table).
    pub fn set_table_name(&mut self, table_name: impl Into<String>) {
        self.table_name = table_name.into();
    }

    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn set_use_transaction(&mut self, use_transaction: bool) {
        self.use_transaction = use_transaction;
    }

    pub fn set_step_delay(&mut self, delay: Duration) {
        self.step_delay = delay;
    }

    /// Create the bookkeeping table if it does not exist
    ///
    /// # Errors
    ///
    /// Returns the database error if the DDL fails.
    pub fn create_state_table(&self) -> Result<(), MigrationError> {
        initialize_state_table(&self.executor, &self.table_name)?;
        Ok(())
    }

    /// Discovered structure, scanned once per root
    ///
    /// # Errors
    ///
    /// Returns the scan errors of [`StructureScanner::scan`].
    pub fn structure(&self) -> Result<&StructureMap, MigrationError> {
        self.structure
            .get_or_try_init(|| StructureScanner::new(&self.root).scan())
    }

    /// Validate a version string against the current root
    ///
    /// # Errors
    ///
    /// See [`VersionValidator::validate`].
    pub fn validate_version(&self, version: &str) -> Result<Version, MigrationError> {
        VersionValidator::new(&self.root).validate(version)
    }

    fn tracker(&self) -> AppliedStateTracker<'_, E> {
        AppliedStateTracker::new(&self.executor, &self.table_name)
    }

    fn step(&self) -> MigrationExecutor<'_, E, P> {
        MigrationExecutor::new(&self.executor, &self.progress, &self.root, &self.table_name)
            .with_step_delay(self.step_delay)
    }

    /// Bring the database to `target`, or to the newest version if `None`
    ///
    /// Applied migrations above `target` are downgraded first (highest
    /// version first), then every version up to `target` is applied.
    /// `0000` files run on every call.
    ///
    /// With the whole-run transaction enabled, any unrecovered failure
    /// rolls back everything this run did.
    ///
    /// # Errors
    ///
    /// Returns the first unrecovered [`MigrationError`].
    pub fn run(&self, target: Option<&str>) -> Result<RunSummary, MigrationError> {
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("strata.run", target = target.unwrap_or("latest")).entered();

        let target = target.map(|t| self.validate_version(t)).transpose()?;

        let scope = if self.use_transaction {
            TransactionScope::enter(&self.executor)?
        } else {
            TransactionScope::ambient(&self.executor)
        };

        let summary = scope.run(|| self.run_migration(target))?;
        log::info!(
            "Run finished: {} applied, {} downgraded, {} always-run, {} skipped, {} orphaned record(s) removed",
            summary.applied,
            summary.downgraded,
            summary.always_run,
            summary.skipped,
            summary.orphans_removed
        );
        Ok(summary)
    }

    fn run_migration(&self, target: Option<Version>) -> Result<RunSummary, MigrationError> {
        let structure = self.structure()?;
        let mut summary = RunSummary::default();
        self.progress.announce("Starting migration", Style::Info);

        if let Some(target) = target {
            self.progress
                .announce(&format!("Migrating to version number {target}"), Style::Info);
            self.downgrade_phase(target, &mut summary)?;
        }

        self.apply_phase(structure, target, &mut summary)?;

        if summary.downgraded > 0 {
            self.progress.announce(
                &format!("Downgraded {} file(s)", summary.downgraded),
                Style::Success,
            );
        }
        if summary.applied == 0 {
            self.progress.announce("Everything is up-to-date", Style::Success);
        } else {
            self.progress
                .announce(&format!("Applied {} file(s)", summary.applied), Style::Success);
        }
        Ok(summary)
    }

    fn downgrade_phase(&self, target: Version, summary: &mut RunSummary) -> Result<(), MigrationError> {
        let tracker = self.tracker();
        let step = self.step();

        for (version, names) in tracker.pending_downgrades(target)? {
            self.progress
                .announce(&format!("Downgrading version {version}"), Style::Heading);

            for name in names {
                match step.downgrade(version, &name) {
                    Ok(_) => summary.downgraded += 1,
                    Err(e) if e.is_recoverable_downgrade() => {
                        log::warn!("Removing orphaned record {version}-{name}: {e}");
                        tracker.record_reverted(version, &name)?;
                        self.progress.update_previous("NON EXISTING", Style::Failure);
                        summary.orphans_removed += 1;
                    }
                    Err(e) => return Err(self.report_failure(e)),
                }
            }
        }
        Ok(())
    }

    fn apply_phase(
        &self,
        structure: &StructureMap,
        target: Option<Version>,
        summary: &mut RunSummary,
    ) -> Result<(), MigrationError> {
        let step = self.step();

        for (version, names) in structure {
            if target.is_some_and(|t| version > t) {
                break;
            }

            self.progress
                .announce(&format!("Applying version {version}"), Style::Heading);

            for name in names {
                match step.apply(version, name) {
                    Ok(StepOutcome::AlwaysRun) => summary.always_run += 1,
                    Ok(_) => summary.applied += 1,
                    Err(e) if e.is_recoverable_apply() => {
                        log::debug!("Skipping {version}-{name}: already applied");
                        self.progress.update_previous("ALREADY APPLIED", Style::Warning);
                        summary.skipped += 1;
                    }
                    Err(e) => return Err(self.report_failure(e)),
                }
            }
        }
        Ok(())
    }

    /// Close the step line of a failed file with an `ERROR` outcome
    ///
    /// Database errors are reported by the step itself.
    fn report_failure(&self, e: MigrationError) -> MigrationError {
        match &e {
            MigrationError::Database(_) => {}
            MigrationError::InvalidDowngradeTarget { name } => {
                self.progress
                    .announce(&format!(" - Downgrading file {name}…"), Style::Plain);
                self.progress.update_previous("ERROR", Style::Failure);
            }
            _ => self.progress.update_previous("ERROR", Style::Failure),
        }
        e
    }

    /// Apply a single file, outside of any run
    ///
    /// # Errors
    ///
    /// See [`MigrationExecutor::run_file`].
    pub fn apply_file(&self, version: Version, name: &str) -> Result<StepOutcome, MigrationError> {
        self.step()
            .apply(version, name)
            .map_err(|e| self.report_failure(e))
    }

    /// Downgrade a single file, outside of any run
    ///
    /// # Errors
    ///
    /// See [`MigrationExecutor::run_file`].
    pub fn downgrade_file(&self, version: Version, name: &str) -> Result<StepOutcome, MigrationError> {
        self.step()
            .downgrade(version, name)
            .map_err(|e| self.report_failure(e))
    }

    /// Run an arbitrary SQL file as one batch, without bookkeeping
    ///
    /// # Errors
    ///
    /// `MissingFile`, `EmptyFile`, or the database error unchanged.
    pub fn import_sql_file(&self, path: impl AsRef<Path>) -> Result<(), MigrationError> {
        import_sql_file(&self.executor, path.as_ref())
    }

    /// Applied migrations above `target`, in downgrade order
    ///
    /// # Errors
    ///
    /// Returns the database error if the query fails.
    pub fn pending_downgrades(&self, target: Version) -> Result<DowngradeSet, MigrationError> {
        Ok(self.tracker().pending_downgrades(target)?)
    }

    /// # Errors
    ///
    /// Returns the database error if the query fails.
    pub fn is_applied(&self, version: Version, name: &str) -> Result<bool, MigrationError> {
        Ok(self.tracker().is_applied(version, name)?)
    }

    /// Number of applied records, optionally only those applied since `since`
    ///
    /// # Errors
    ///
    /// Returns the database error if the query fails.
    pub fn applied_count(&self, since: Option<NaiveDateTime>) -> Result<u64, MigrationError> {
        Ok(self.tracker().count(since)?)
    }

    /// Applied vs pending migrations
    ///
    /// # Errors
    ///
    /// Returns scan errors or the database error.
    pub fn status(&self) -> Result<MigrationStatus, MigrationError> {
        let applied = self.tracker().applied_records()?;
        Ok(MigrationStatus::new(self.structure()?, applied))
    }

    /// Execute a statement on the engine's connection
    ///
    /// # Errors
    ///
    /// Returns the database error unchanged.
    pub fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<bool, DbError> {
        raw_sql::execute_statement(&self.executor, sql, params).map(|_| true)
    }

    /// Run a query on the engine's connection
    ///
    /// # Errors
    ///
    /// Returns the database error unchanged.
    pub fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>, DbError> {
        raw_sql::find_all_by_statement(&self.executor, sql, params)
    }

    #[must_use]
    pub fn executor(&self) -> &E {
        &self.executor
    }

    #[must_use]
    pub fn progress(&self) -> &P {
        &self.progress
    }

    /// Give back the executor and progress sink
    pub fn into_parts(self) -> (E, P) {
        (self.executor, self.progress)
    }
}
