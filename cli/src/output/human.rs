//! Human-readable terminal renderer.

use datastack_common::ServiceStatus;
use owo_colors::OwoColorize as _;

use crate::domain::{DeploymentResult, RunKind, StatusView};
use crate::output::OutputContext;

/// Renders domain types as human-readable terminal output using `OutputContext`.
pub struct HumanRenderer<'a> {
    ctx: &'a OutputContext,
}

impl<'a> HumanRenderer<'a> {
    /// Create a new `HumanRenderer` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }

    /// Render the CLI version information.
    pub fn render_version(&self, version: &str) {
        if self.ctx.quiet {
            return;
        }
        self.ctx.info(&format!("datastack v{version}"));
    }

    /// Summarize a deploy or destroy run.
    ///
    /// Failures go to stderr and are printed even when `quiet`.
    pub fn render_result(&self, result: &DeploymentResult) {
        let verb = match result.kind {
            RunKind::Deploy => "deployed",
            RunKind::Destroy => "destroyed",
        };
        let mode = if result.dry_run { " (dry run)" } else { "" };

        if !self.ctx.quiet {
            println!();
            self.ctx.header(&format!("Summary{mode}"));
            self.ctx
                .kv(&format!("{verb}:"), &result.completed.len().to_string());
            if !result.skipped.is_empty() {
                self.ctx.kv(
                    "skipped:",
                    &format!("{} (already completed)", result.skipped.len()),
                );
            }
            if !result.not_attempted.is_empty() {
                let names: Vec<String> =
                    result.not_attempted.iter().map(|s| s.service.to_string()).collect();
                self.ctx.kv("not attempted:", &names.join(", "));
            }
        }

        for failure in &result.failed {
            self.ctx.error(&format!(
                "{}/{} failed: {}",
                failure.phase, failure.service, failure.error
            ));
            if let Some(command) = &failure.command {
                eprintln!("      command: {}", command.style(self.ctx.styles.dim));
            }
        }
        if result.interrupted {
            self.ctx.error("interrupted; state saved after the last finished service");
        }
        if !result.is_success() && result.kind == RunKind::Deploy {
            eprintln!(
                "  {} re-run with --resume to continue; {} completed service(s) will be skipped",
                "ℹ".style(self.ctx.styles.info),
                result.resumable_completed,
            );
        } else if result.is_success() {
            self.ctx.success(&format!("all requested services {verb}{mode}"));
        }
    }

    /// Render per-phase, per-service state.
    pub fn render_status(&self, status: &StatusView) {
        if self.ctx.quiet {
            return;
        }
        let mode = if status.dry_run { " (dry run)" } else { "" };
        println!();
        self.ctx.kv("Customer:", &status.customer);
        self.ctx.kv(
            "Progress:",
            &format!("{}/{} services completed{mode}", status.completed, status.total),
        );
        self.ctx
            .kv("Updated:", &status.updated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string());

        for phase in &status.phases {
            println!();
            let mark = if phase.completed {
                "✓".style(self.ctx.styles.success).to_string()
            } else {
                " ".to_string()
            };
            println!(
                "  {mark} {}",
                format!("{}. {}", phase.phase.number(), phase.name).style(self.ctx.styles.header)
            );
            for service in &phase.services {
                let version = service
                    .chart_version
                    .as_deref()
                    .map(|v| format!(" {v}"))
                    .unwrap_or_default();
                println!(
                    "      {:<18} {}{}",
                    service.service,
                    self.status_label(service.status),
                    version.style(self.ctx.styles.dim)
                );
                if let Some(error) = &service.last_error {
                    println!("        {}", error.style(self.ctx.styles.error));
                }
            }
        }
        println!();
    }

    /// Report the outcome of `datastack decrypt`.
    pub fn render_decrypted(&self, restored: usize, root: &std::path::Path) {
        self.ctx
            .success(&format!("decrypted {restored} file(s) under {}", root.display()));
    }

    fn status_label(&self, status: ServiceStatus) -> String {
        let styles = &self.ctx.styles;
        let label = status_display(status);
        match status {
            ServiceStatus::Completed => label.style(styles.success).to_string(),
            ServiceStatus::Failed => label.style(styles.error).to_string(),
            ServiceStatus::Rendering | ServiceStatus::Applying => {
                label.style(styles.warning).to_string()
            }
            ServiceStatus::Pending => label.style(styles.dim).to_string(),
        }
    }
}

// ── Display helpers ─────────────────────────────────────────────────────────

/// Status words as the operator sees them; an interrupted run leaves
/// `rendering` or `applying` behind.
#[must_use]
pub fn status_display(status: ServiceStatus) -> &'static str {
    match status {
        ServiceStatus::Pending => "pending",
        ServiceStatus::Rendering => "interrupted (rendering)",
        ServiceStatus::Applying => "interrupted (applying)",
        ServiceStatus::Completed => "completed",
        ServiceStatus::Failed => "failed",
    }
}
