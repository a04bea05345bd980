//! Tests for CLI report formatting

use strata::migration::{MigrationError, Version};
use strata_migrate::report::{banner_lines, error_trace, wrap, WRAP_WIDTH};

#[test]
fn test_wrap_short_text_is_one_line() {
    assert_eq!(wrap("nothing to see", WRAP_WIDTH), vec!["nothing to see"]);
}

#[test]
fn test_wrap_breaks_on_word_boundaries() {
    let lines = wrap("alpha beta gamma delta", 11);
    assert_eq!(lines, vec!["alpha beta", "gamma delta"]);
}

#[test]
fn test_wrap_keeps_long_words_whole() {
    let lines = wrap("a averyveryverylongword b", 5);
    assert_eq!(lines, vec!["a", "averyveryverylongword", "b"]);
}

#[test]
fn test_wrap_preserves_line_breaks() {
    assert_eq!(wrap("first\nsecond", WRAP_WIDTH), vec!["first", "second"]);
}

#[test]
fn test_banner_rows_share_width() {
    let rows = banner_lines("relation \"users\" already exists");

    assert_eq!(rows.len(), 3);
    let width = rows[0].chars().count();
    assert!(rows.iter().all(|row| row.chars().count() == width));
    assert!(rows[0].trim().is_empty());
    assert!(rows[2].trim().is_empty());
    assert_eq!(
        rows[1].trim_end(),
        "  An error occurred during migration: relation \"users\" already exists"
    );
    assert_eq!(width, rows[1].trim_end().chars().count() + 2);
}

#[test]
fn test_banner_wraps_long_messages() {
    let rows = banner_lines(&"word ".repeat(40));

    assert!(rows.len() > 3);
    for row in &rows[1..rows.len() - 1] {
        assert!(row.trim_end().chars().count() <= WRAP_WIDTH + 2);
        assert!(row.starts_with("  "));
    }
}

#[test]
fn test_error_trace_uses_migration_error_code() {
    let error = anyhow::Error::new(MigrationError::AlreadyApplied {
        version: Version::new(3).unwrap(),
        name: "new_table".to_string(),
    });

    let trace = error_trace(&error);
    assert_eq!(trace["code"], "AlreadyApplied");
    assert_eq!(trace["message"], "Migration 0003-new_table is already applied");
    assert!(trace["chain"].as_array().unwrap().is_empty());
}

#[test]
fn test_error_trace_for_other_errors() {
    let error = anyhow::anyhow!("connection refused").context("could not connect");

    let trace = error_trace(&error);
    assert_eq!(trace["code"], "Error");
    assert_eq!(trace["message"], "could not connect");
    assert_eq!(trace["chain"][0], "connection refused");
}
