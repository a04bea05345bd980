//! Tests for layering command-line arguments over a configuration file

use clap::Parser;
use std::fs;
use std::path::PathBuf;
use strata::MigrationConfig;
use strata_migrate::cli::Cli;
use tempfile::TempDir;

fn config_file(dir: &TempDir) -> PathBuf {
    let file = dir.path().join("strata.toml");
    fs::write(
        &file,
        r#"
[migration]
database_url = "postgres://config-host/app"
path = "db/migrations"
table_name = "schema_log"
step_delay_ms = 100
"#,
    )
    .unwrap();
    file
}

#[test]
fn test_arguments_win_over_file_values() {
    let dir = TempDir::new().unwrap();
    let loaded = MigrationConfig::load_from(config_file(&dir)).unwrap();

    let cli = Cli::try_parse_from([
        "strata-migrate",
        "--dsn",
        "postgres://cli-host/app",
        "--path",
        "sql",
    ])
    .unwrap();
    let config = cli.apply_to(loaded);

    assert_eq!(config.database_url, "postgres://cli-host/app");
    assert_eq!(config.path, PathBuf::from("sql"));
    // Not given on the command line, so the file value stays
    assert_eq!(config.table_name, "schema_log");
    assert_eq!(config.step_delay_ms, 100);
    assert!(config.use_transaction);
}

#[test]
fn test_no_transaction_flag_overrides_file() {
    let dir = TempDir::new().unwrap();
    let loaded = MigrationConfig::load_from(config_file(&dir)).unwrap();

    let cli = Cli::try_parse_from([
        "strata-migrate",
        "--dsn",
        "postgres://cli-host/app",
        "--path",
        "sql",
        "--no-transaction",
    ])
    .unwrap();

    assert!(!cli.apply_to(loaded).use_transaction);
}
