//! Progress reporting sinks.
//!
//! The engine reports what it is doing through [`Progress`]: `announce`
//! starts a new line, `update_previous` attaches an outcome (`MIGRATED`,
//! `ALREADY APPLIED`, ...) to the most recently announced one. How that is
//! rendered is up to the sink.

use colored::{Color, Colorize};
use std::cell::RefCell;
use std::io::{self, Stdout, Write};

/// Visual weight of a progress message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Style {
    #[default]
    Plain,
    /// Run-level information (cyan)
    Info,
    /// Per-version headings (magenta)
    Heading,
    /// Completed work (green)
    Success,
    /// Skipped work (yellow)
    Warning,
    /// Errors and orphaned records (red)
    Failure,
}

impl Style {
    #[must_use]
    pub fn color(self) -> Option<Color> {
        match self {
            Style::Plain => None,
            Style::Info => Some(Color::Cyan),
            Style::Heading => Some(Color::Magenta),
            Style::Success => Some(Color::Green),
            Style::Warning => Some(Color::Yellow),
            Style::Failure => Some(Color::Red),
        }
    }
}

/// Progress-reporting interface injected into the migrator
pub trait Progress {
    /// Print a new progress line
    fn announce(&self, message: &str, style: Style);

    /// Attach an outcome to the previously announced line
    fn update_previous(&self, message: &str, style: Style);
}

impl<T: Progress + ?Sized> Progress for &T {
    fn announce(&self, message: &str, style: Style) {
        (**self).announce(message, style);
    }

    fn update_previous(&self, message: &str, style: Style) {
        (**self).update_previous(message, style);
    }
}

impl<T: Progress + ?Sized> Progress for Box<T> {
    fn announce(&self, message: &str, style: Style) {
        (**self).announce(message, style);
    }

    fn update_previous(&self, message: &str, style: Style) {
        (**self).update_previous(message, style);
    }
}

const SAVE_CURSOR: &str = "\x1b[s";
const RESTORE_CURSOR_UP: &str = "\x1b[u\x1b[A";

/// Coloured terminal output
///
/// `announce` saves the cursor position at the end of the line so that
/// `update_previous` can jump back and print the outcome beside it.
pub struct ColoredProgress<W: Write = Stdout> {
    out: RefCell<W>,
}

impl ColoredProgress<Stdout> {
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl Default for ColoredProgress<Stdout> {
    fn default() -> Self {
        Self::stdout()
    }
}

impl<W: Write> ColoredProgress<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: RefCell::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    fn paint(message: &str, style: Style) -> String {
        match style.color() {
            Some(color) => message.color(color).to_string(),
            None => message.to_string(),
        }
    }
}

impl<W: Write> Progress for ColoredProgress<W> {
    fn announce(&self, message: &str, style: Style) {
        let mut out = self.out.borrow_mut();
        let _ = writeln!(out, "{}{SAVE_CURSOR}", Self::paint(message, style));
        let _ = out.flush();
    }

    fn update_previous(&self, message: &str, style: Style) {
        let mut out = self.out.borrow_mut();
        let _ = writeln!(out, "{RESTORE_CURSOR_UP} {}", Self::paint(message, style));
        let _ = out.flush();
    }
}

/// Escape-free output for logs and dumb terminals
///
/// Updates are printed on their own line as ` -> MESSAGE`.
pub struct PlainProgress<W: Write = Stdout> {
    out: RefCell<W>,
}

impl PlainProgress<Stdout> {
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> PlainProgress<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: RefCell::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl<W: Write> Progress for PlainProgress<W> {
    fn announce(&self, message: &str, _style: Style) {
        let _ = writeln!(self.out.borrow_mut(), "{message}");
    }

    fn update_previous(&self, message: &str, _style: Style) {
        let _ = writeln!(self.out.borrow_mut(), " -> {message}");
    }
}

/// Routes progress into the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl Progress for LogProgress {
    fn announce(&self, message: &str, style: Style) {
        match style {
            Style::Failure => log::error!("{}", message.trim()),
            Style::Warning => log::warn!("{}", message.trim()),
            _ => log::info!("{}", message.trim()),
        }
    }

    fn update_previous(&self, message: &str, style: Style) {
        self.announce(message, style);
    }
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl Progress for SilentProgress {
    fn announce(&self, _message: &str, _style: Style) {}

    fn update_previous(&self, _message: &str, _style: Style) {}
}
