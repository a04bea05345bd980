//! Strata migration CLI
//!
//! Brings a PostgreSQL database to a migration version, or lists what is
//! applied and pending.

use clap::error::ErrorKind;
use clap::Parser;
use std::process;
use strata::progress::{ColoredProgress, PlainProgress, Progress};
use strata::{MigrationConfig, Migrator};
use strata_migrate::cli::{Cli, Commands};
use strata_migrate::report;

fn main() {
    dotenv::dotenv().ok();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp
            | ErrorKind::DisplayVersion
            | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => e.exit(),
            _ => {
                let _ = e.print();
                process::exit(1);
            }
        },
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_filter())).init();

    let missing = cli.missing_arguments();
    if !missing.is_empty() {
        for name in missing {
            println!(" - Missing required argument --{name}");
        }
        process::exit(1);
    }

    let config = match MigrationConfig::load() {
        Ok(config) => config,
        Err(e) => {
            log::warn!("Ignoring configuration file: {e}");
            MigrationConfig::default()
        }
    };
    let config = cli.apply_to(config);

    match execute(&cli, &config) {
        Ok(()) => process::exit(0),
        Err(e) => {
            report::print_failure_banner(&e);
            if cli.debug {
                eprintln!("Stack trace: ");
                match serde_json::to_string_pretty(&report::error_trace(&e)) {
                    Ok(trace) => eprintln!("{trace}"),
                    Err(_) => eprintln!("{e:?}"),
                }
            }
            process::exit(2);
        }
    }
}

fn execute(cli: &Cli, config: &MigrationConfig) -> anyhow::Result<()> {
    let progress: Box<dyn Progress> = if cli.plain {
        Box::new(PlainProgress::stdout())
    } else {
        Box::new(ColoredProgress::stdout())
    };

    let migrator = Migrator::connect(config, progress)?;

    match cli.subcommand() {
        Commands::Run => {
            let summary = migrator.run(cli.target.as_deref())?;
            log::info!(
                "Run finished: {} applied, {} downgraded, {} always-run",
                summary.applied,
                summary.downgraded,
                summary.always_run
            );
        }
        Commands::Status => report::print_status(&migrator.status()?),
    }
    Ok(())
}
