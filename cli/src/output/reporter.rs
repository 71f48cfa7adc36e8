//! `TerminalReporter`: Presentation-layer implementation of `ProgressReporter`.
//!
//! Application services emit progress through the port; this type decides
//! whether that becomes a spinner, a plain line, or nothing at all.

use std::sync::{Mutex, PoisonError};

use indicatif::ProgressBar;
use owo_colors::OwoColorize as _;

use crate::application::ports::ProgressReporter;
use crate::output::{OutputContext, progress};

/// Terminal progress reporter that wraps an `OutputContext`.
///
/// - `step()` starts a spinner on a TTY, or prints `"  → {message}"`
/// - `success()` / `warn()` finish the running spinner, if any
/// - `reveal()` always prints to stderr, even with `--quiet` or `--json`
pub struct TerminalReporter<'a> {
    ctx: &'a OutputContext,
    active: Mutex<Option<ProgressBar>>,
}

impl<'a> TerminalReporter<'a> {
    /// Create a new `TerminalReporter` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self {
            ctx,
            active: Mutex::new(None),
        }
    }

    fn take_spinner(&self) -> Option<ProgressBar> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn finish(&self, mark: String, message: &str) {
        if let Some(pb) = self.take_spinner() {
            progress::finish_with(&pb, &mark, message);
        } else if !self.ctx.quiet {
            println!("  {mark} {message}");
        }
    }
}

impl ProgressReporter for TerminalReporter<'_> {
    fn step(&self, message: &str) {
        if let Some(previous) = self.take_spinner() {
            previous.finish_and_clear();
        }
        if self.ctx.show_progress() {
            let pb = progress::spinner(message);
            *self.active.lock().unwrap_or_else(PoisonError::into_inner) = Some(pb);
        } else if !self.ctx.quiet {
            println!("  {} {message}", "→".style(self.ctx.styles.info));
        }
    }

    fn success(&self, message: &str) {
        self.finish("✓".style(self.ctx.styles.success).to_string(), message);
    }

    fn warn(&self, message: &str) {
        self.finish("!".style(self.ctx.styles.warning).to_string(), message);
    }

    fn reveal(&self, label: &str, value: &str) {
        let spinner = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        let print = || {
            eprintln!();
            eprintln!("  {}", label.style(self.ctx.styles.bold));
            eprintln!("    {}", value.style(self.ctx.styles.reveal));
            eprintln!();
        };
        match spinner.as_ref() {
            Some(pb) => pb.suspend(print),
            None => print(),
        }
    }
}

impl Drop for TerminalReporter<'_> {
    fn drop(&mut self) {
        if let Some(pb) = self.take_spinner() {
            pb.finish_and_clear();
        }
    }
}
