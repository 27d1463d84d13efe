use crate::token::{Token, TokenKind};
use colored::Colorize;
use std::fmt;

/// Which stage of the pipeline produced a diagnostic — mirrors the
/// teacher's `reporter::Phase`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Scanning,
    Parsing,
    Runtime,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Scanning => write!(f, "scanning"),
            Phase::Parsing => write!(f, "parsing"),
            Phase::Runtime => write!(f, "runtime"),
        }
    }
}

/// One diagnostic: what phase produced it, the message, and the token
/// it is anchored to. `Token` is `Copy`, so `Report` owns one outright
/// rather than wrapping it in `Rc` the way the teacher does — there is
/// no reason to share it once collected.
#[derive(Debug, Clone)]
pub struct Report<'a> {
    pub phase: Phase,
    pub message: String,
    pub token: Token<'a>,
}

impl<'a> Report<'a> {
    pub fn new(phase: Phase, message: String, token: Token<'a>) -> Self {
        Self {
            phase,
            message,
            token,
        }
    }
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[line {}] Error", self.token.line)?;
        match self.token.kind {
            TokenKind::Eof => write!(f, " at end")?,
            TokenKind::Error => {}
            _ => write!(f, " at {}", self.token)?,
        }
        write!(f, ": {}", self.message)
    }
}

/// Injectable diagnostic sink. Generalizes the teacher's `Reporter`
/// trait so tests can capture diagnostics without touching stdout —
/// exactly what the teacher's own `main.rs` test module does with its
/// `ErrorsTracker`.
pub trait Reporter<'a> {
    fn warning(&mut self, report: Report<'a>);
    fn error(&mut self, report: Report<'a>);
}

/// Prints diagnostics to stdout/stderr, colored the way the teacher's
/// `compiler`/`parser` crates color their own `Display` impls via the
/// `colored` crate.
#[derive(Default)]
pub struct CliReporter {
    pub errors: usize,
    pub warnings: usize,
}

impl CliReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<'a> Reporter<'a> for CliReporter {
    fn warning(&mut self, report: Report<'a>) {
        self.warnings += 1;
        println!("{}: {}", "warning".yellow().bold(), report);
    }

    fn error(&mut self, report: Report<'a>) {
        self.errors += 1;
        eprintln!("{}: {}", "error".red().bold(), report);
    }
}

/// Collects reports instead of printing them — used by tests and by
/// the embedding API's lower-level entry points.
#[derive(Default)]
pub struct CollectingReporter<'a> {
    pub warnings: Vec<Report<'a>>,
    pub errors: Vec<Report<'a>>,
}

impl<'a> CollectingReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<'a> Reporter<'a> for CollectingReporter<'a> {
    fn warning(&mut self, report: Report<'a>) {
        self.warnings.push(report);
    }

    fn error(&mut self, report: Report<'a>) {
        self.errors.push(report);
    }
}
