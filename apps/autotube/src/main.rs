//! autotube entry point.
//!
//! Exit status: 0 when every selected capture was uploaded and cataloged
//! (or nothing was selected), 1 when the run could not start, 2 when at
//! least one capture failed.

mod app;
mod config;

use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,autotube=debug")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting autotube");

    match run() {
        Ok(summary) if summary.all_succeeded() => ExitCode::SUCCESS,
        Ok(summary) => {
            tracing::warn!(failed = summary.failed, "some uploads failed");
            ExitCode::from(2)
        }
        Err(e) => {
            tracing::error!(error = ?e, "run failed");
            eprintln!("Error: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn run() -> anyhow::Result<autotube_uploader::RunSummary> {
    let config = config::Config::load()?;
    tracing::info!(
        captures_root = %config.captures_root.display(),
        workers = config.workers,
        daily_cap = config.daily_cap,
        "configuration loaded"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(config))
}
