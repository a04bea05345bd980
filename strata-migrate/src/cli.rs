//! Command-line arguments

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use strata::MigrationConfig;

#[derive(Debug, Parser)]
#[command(name = "strata-migrate")]
#[command(about = "Apply and revert folder-based SQL migrations")]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// Connection descriptor (postgres://... or key=value form)
    #[arg(long, env = "STRATA_DATABASE_URL")]
    pub dsn: Option<String>,

    /// Database user, if not part of the descriptor
    #[arg(long, env = "STRATA_USERNAME")]
    pub username: Option<String>,

    /// Database password, if not part of the descriptor
    #[arg(long, env = "STRATA_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Migrations root directory
    #[arg(long, env = "STRATA_MIGRATIONS_PATH")]
    pub path: Option<PathBuf>,

    /// Target version (VVVV); newer applied migrations are downgraded
    #[arg(long = "version", value_name = "VVVV")]
    pub target: Option<String>,

    /// Bookkeeping table name
    #[arg(long)]
    pub table_name: Option<String>,

    /// Commit file by file instead of wrapping the run in one transaction
    #[arg(long)]
    pub no_transaction: bool,

    /// Pause before each file, in milliseconds
    #[arg(long, value_name = "MS")]
    pub step_delay_ms: Option<u64>,

    /// Progress without colours or cursor movement
    #[arg(long)]
    pub plain: bool,

    /// Print a JSON diagnostic trace on failure
    #[arg(long)]
    pub debug: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Run migrations (default)
    Run,
    /// Show applied and pending migrations
    Status,
}

impl Cli {
    #[must_use]
    pub fn subcommand(&self) -> Commands {
        self.command.unwrap_or(Commands::Run)
    }

    /// Required arguments that were not given
    #[must_use]
    pub fn missing_arguments(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.dsn.as_deref().map_or(true, str::is_empty) {
            missing.push("dsn");
        }
        if self.path.is_none() {
            missing.push("path");
        }
        missing
    }

    /// Default `env_logger` filter for the chosen verbosity
    #[must_use]
    pub fn log_filter(&self) -> &'static str {
        if self.quiet {
            "error"
        } else if self.verbose {
            "debug"
        } else {
            "warn"
        }
    }

    /// Overlay the arguments on a loaded configuration
    #[must_use]
    pub fn apply_to(&self, mut config: MigrationConfig) -> MigrationConfig {
        if let Some(dsn) = &self.dsn {
            config.database_url.clone_from(dsn);
        }
        if self.username.is_some() {
            config.username.clone_from(&self.username);
        }
        if self.password.is_some() {
            config.password.clone_from(&self.password);
        }
        if let Some(path) = &self.path {
            config.path.clone_from(path);
        }
        if let Some(table_name) = &self.table_name {
            config.table_name.clone_from(table_name);
        }
        if self.no_transaction {
            config.use_transaction = false;
        }
        if let Some(delay) = self.step_delay_ms {
            config.step_delay_ms = delay;
        }
        config
    }
}
