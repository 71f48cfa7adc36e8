//! datastack - phased, resumable installer for a multi-cloud data platform

use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use datastack_cli::application::executor::DRY_RUN_TARGET;
use datastack_cli::cli::Cli;
use datastack_cli::domain::{DeployError, classify};
use datastack_cli::output::json::format_error;
use tracing_subscriber::EnvFilter;

/// Latched by the first Ctrl-C; the orchestrator checks it between services.
static CANCEL: AtomicBool = AtomicBool::new(false);

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let json = cli.json;

    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            CANCEL.store(true, Ordering::SeqCst);
            eprintln!("\n  interrupt received; stopping after the current service (Ctrl-C again to abort)");
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(130);
            }
        }
    });

    match cli.run(&CANCEL).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            report_error(&e, json);
            std::process::exit(1);
        }
    }
}

/// Logs go to stderr so `--json` output on stdout stays parseable.
fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let default = format!("datastack_cli={level},{DRY_RUN_TARGET}=info");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn report_error(e: &anyhow::Error, json: bool) {
    let code = classify(e).map_or("error", DeployError::code);
    if json {
        match format_error(&format!("{e:#}"), code) {
            Ok(out) => println!("{out}"),
            Err(_) => eprintln!("Error: {e:#}"),
        }
    } else {
        eprintln!("Error: {e:#}");
    }
}
