//! Terminal output for the CLI: the failure banner, the `--debug` trace and
//! the `status` listing.

use colored::Colorize;
use serde_json::{json, Value};
use strata::migration::{MigrationError, MigrationStatus};

/// Column at which banner text is wrapped
pub const WRAP_WIDTH: usize = 75;

/// Greedy word wrap
///
/// Words longer than `width` are kept whole on their own line. Existing line
/// breaks are preserved.
#[must_use]
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            if current.is_empty() {
                current.push_str(word);
            } else if current.chars().count() + 1 + word.chars().count() <= width {
                current.push(' ');
                current.push_str(word);
            } else {
                lines.push(std::mem::take(&mut current));
                current.push_str(word);
            }
        }
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// Uncoloured rows of the failure banner
///
/// A blank row, the wrapped message indented by two spaces, and another blank
/// row. Every row has the same width: the longest line plus four.
#[must_use]
pub fn banner_lines(error: &str) -> Vec<String> {
    let message = format!("An error occurred during migration: {error}");
    let wrapped = wrap(&message, WRAP_WIDTH);
    let width = wrapped.iter().map(|line| line.chars().count()).max().unwrap_or(0) + 4;

    let blank = " ".repeat(width);
    let mut rows = Vec::with_capacity(wrapped.len() + 2);
    rows.push(blank.clone());
    for line in &wrapped {
        rows.push(format!("  {:<pad$}", line, pad = width - 2));
    }
    rows.push(blank);
    rows
}

/// Print the failure banner on stderr with a red background
pub fn print_failure_banner(error: &anyhow::Error) {
    for row in banner_lines(&error.to_string()) {
        eprintln!("{}", row.on_red());
    }
}

/// Diagnostic trace printed with `--debug`
#[must_use]
pub fn error_trace(error: &anyhow::Error) -> Value {
    let code = error
        .downcast_ref::<MigrationError>()
        .map_or("Error", MigrationError::code);
    let chain: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();

    json!({
        "code": code,
        "message": error.to_string(),
        "chain": chain,
    })
}

/// Print applied, pending and orphaned migrations
pub fn print_status(status: &MigrationStatus) {
    println!("\n{}\n", "Migration Status".bold());

    if status.applied.is_empty() {
        println!("{} None", "Applied:".green());
    } else {
        println!("{} ({})", "Applied:".green(), status.applied_count());
        for record in &status.applied {
            println!(
                "  ✓ {}/{} ({})",
                record.version,
                record.name,
                record.applied_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
    }

    println!();

    if status.pending.is_empty() {
        println!("{} None", "Pending:".yellow());
    } else {
        println!("{} ({})", "Pending:".yellow(), status.pending_count());
        for pending in &status.pending {
            println!("  ⏳ {}/{}", pending.version, pending.name);
        }
    }

    if !status.orphaned.is_empty() {
        println!();
        println!("{} ({})", "Orphaned records:".red(), status.orphaned.len());
        for record in &status.orphaned {
            println!("  ✗ {}/{}", record.version, record.name);
        }
    }

    if !status.always_run.is_empty() {
        println!();
        println!("{} {}", "Always run:".cyan(), status.always_run.join(", "));
    }

    println!(
        "\nSummary: {} applied, {} pending",
        status.applied_count(),
        status.pending_count()
    );
}
