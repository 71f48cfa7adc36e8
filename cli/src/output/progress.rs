//! Progress indicators using indicatif

#![allow(clippy::expect_used)] // Templates are compile-time constants

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Create a spinner for one running service.
///
/// # Panics
///
/// Panics if the spinner template string is invalid (it is a compile-time constant and will not panic).
#[must_use]
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", " "])
            .template("  {spinner:.cyan} {msg} {elapsed:.dim}")
            .expect("valid template"),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Finish a spinner with a mark on the left (`✓`, `!`).
pub fn finish_with(pb: &ProgressBar, mark: &str, msg: &str) {
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {prefix} {msg}")
            .expect("valid template"),
    );
    pb.set_prefix(mark.to_string());
    pb.finish_with_message(msg.to_string());
}
