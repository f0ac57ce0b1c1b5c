//! Presentation-layer implementations of `ProgressReporter`.
//!
//! Application services emit progress through the port; these types decide
//! whether it becomes plain lines or a spinner.

use std::cell::RefCell;

use indicatif::ProgressBar;
use owo_colors::OwoColorize as _;

use crate::application::ports::ProgressReporter;
use crate::output::{OutputContext, progress};

/// Terminal progress reporter that wraps an `OutputContext`.
///
/// - `step()` prints `"  → {message}"` (suppressed when `ctx.quiet`)
/// - `success()` prints `"  ✓ {message}"` (suppressed when `ctx.quiet`)
/// - `warn()` prints `"  ! {message}"` (suppressed when `ctx.quiet`)
pub struct TerminalReporter<'a> {
    ctx: &'a OutputContext,
}

impl<'a> TerminalReporter<'a> {
    /// Create a new `TerminalReporter` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }
}

impl ProgressReporter for TerminalReporter<'_> {
    fn step(&self, message: &str) {
        if !self.ctx.quiet {
            println!("  {} {message}", "→".style(self.ctx.styles.info));
        }
    }

    fn success(&self, message: &str) {
        if !self.ctx.quiet {
            println!("  {} {message}", "✓".style(self.ctx.styles.success));
        }
    }

    fn warn(&self, message: &str) {
        if !self.ctx.quiet {
            println!("  {} {message}", "!".style(self.ctx.styles.warning));
        }
    }
}

/// Reporter for long-running provider calls: each step replaces a spinner
/// on an interactive terminal, falling back to plain lines otherwise.
pub struct SpinnerReporter<'a> {
    ctx: &'a OutputContext,
    current: RefCell<Option<ProgressBar>>,
}

impl<'a> SpinnerReporter<'a> {
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self {
            ctx,
            current: RefCell::new(None),
        }
    }

    /// Stop any running spinner, marking it failed.
    pub fn abandon(&self, message: &str) {
        if let Some(pb) = self.current.borrow_mut().take() {
            progress::finish_error(&pb, message);
        }
    }
}

impl ProgressReporter for SpinnerReporter<'_> {
    fn step(&self, message: &str) {
        if !self.ctx.show_progress() {
            TerminalReporter::new(self.ctx).step(message);
            return;
        }
        let mut current = self.current.borrow_mut();
        if let Some(pb) = current.take() {
            pb.finish_and_clear();
        }
        *current = Some(progress::spinner(message));
    }

    fn success(&self, message: &str) {
        match self.current.borrow_mut().take() {
            Some(pb) => progress::finish_ok(&pb, message),
            None => TerminalReporter::new(self.ctx).success(message),
        }
    }

    fn warn(&self, message: &str) {
        match self.current.borrow().as_ref() {
            Some(pb) => pb.println(format!("  ! {message}")),
            None => TerminalReporter::new(self.ctx).warn(message),
        }
    }
}

impl Drop for SpinnerReporter<'_> {
    fn drop(&mut self) {
        if let Some(pb) = self.current.get_mut().take() {
            pb.finish_and_clear();
        }
    }
}

/// Reporter that discards progress, for machine-readable output modes where
/// stdout carries a single document.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {
    fn step(&self, _message: &str) {}
    fn success(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
}
