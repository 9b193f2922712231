//! One upload run: discover, upload, catalog, clean up.

use std::sync::Arc;

use anyhow::Context;
use autotube_auth::{ClientSecret, OAuthAuthenticator, TokenStore};
use autotube_catalog::CatalogManager;
use autotube_host::{HostHandle, YouTubeClient};
use autotube_transfer::TransferEngine;
use autotube_uploader::{Cleanup, Orchestrator, RunEvent, RunSummary, summarize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;

/// Runs one upload pass and returns its summary.
pub async fn run(config: Config) -> anyhow::Result<RunSummary> {
    let root = config.captures_root.clone();
    let extensions = config.extensions.clone();
    let cap = config.daily_cap;
    let items = tokio::task::spawn_blocking(move || {
        autotube_inventory::list_candidates(&root, &extensions, cap)
    })
    .await??;

    if items.is_empty() {
        println!("No files to upload.");
        return Ok(RunSummary::default());
    }
    println!("Found {} files to upload.", items.len());

    let secret = ClientSecret::load(&config.client_secret_path)?;
    let store = Arc::new(TokenStore::new(config.token_path.clone())?);
    let auth = OAuthAuthenticator::new(secret, store)?.with_consent_handler(Box::new(|url: &str| {
        println!("Authorize this app by visiting:\n{url}");
        if let Err(e) = open::that(url) {
            warn!(error = %e, "could not open a browser");
        }
    }));

    let host: HostHandle = Arc::new(YouTubeClient::new()?);
    let engine = TransferEngine::new(Arc::clone(&host), config.chunk_policy());
    let catalog = Arc::new(
        CatalogManager::new(host)
            .with_page_size(config.collection_page_size)
            .with_privacy(config.collection_privacy),
    );

    let (events_tx, events_rx) = mpsc::channel(256);
    let renderer = tokio::spawn(render_events(events_rx));

    let orchestrator = Orchestrator::new(Arc::new(auth), engine, catalog, config.upload_settings())
        .with_events(events_tx.clone());
    let cancel = orchestrator.cancel_token();
    let watchdog = tokio::spawn(watch_for_stop(cancel.clone(), config.run_deadline()));

    let result = orchestrator
        .run(items)
        .await
        .context("upload run could not start");
    watchdog.abort();
    drop(orchestrator);

    let summary = match result {
        Ok(ledger) => {
            let report = Cleanup::new().with_events(events_tx).run(&ledger).await;
            summarize(&ledger, &report)
        }
        Err(e) => {
            drop(events_tx);
            let _ = renderer.await;
            return Err(e);
        }
    };

    let _ = renderer.await;
    println!(
        "Uploaded {}/{} files, {} failed, {} deleted ({} could not be deleted).",
        summary.succeeded, summary.selected, summary.failed, summary.deleted, summary.delete_failures
    );
    info!(?summary, "run complete");
    Ok(summary)
}

/// Cancels the run on Ctrl-C or when the deadline passes.
async fn watch_for_stop(cancel: CancellationToken, deadline: Option<std::time::Duration>) {
    let deadline = async {
        match deadline {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => warn!("interrupted, cancelling remaining uploads"),
        _ = deadline => warn!("run deadline reached, cancelling remaining uploads"),
    }
    cancel.cancel();
}

/// Prints one status line per event until every sender is gone.
async fn render_events(mut events: mpsc::Receiver<RunEvent>) {
    let mut console = Console::default();
    while let Some(event) = events.recv().await {
        if let Some(line) = console.line(&event) {
            println!("{line}");
        }
    }
}

/// Formats run events as console lines.
#[derive(Default)]
struct Console {
    total: usize,
    /// Last progress decile printed per item.
    printed: std::collections::HashMap<usize, u64>,
}

impl Console {
    fn line(&mut self, event: &RunEvent) -> Option<String> {
        match event {
            RunEvent::Dispatched {
                index,
                total,
                path,
                category,
            } => {
                self.total = *total;
                Some(format!(
                    "{} Uploading {} from folder '{category}'...",
                    self.tag(*index),
                    path.display()
                ))
            }
            RunEvent::Progress { index, progress } => {
                let percent = progress.percent().floor() as u64;
                let decile = percent / 10;
                if self.printed.get(index).is_some_and(|&d| d >= decile) {
                    return None;
                }
                self.printed.insert(*index, decile);
                let mut line = format!(
                    "{} {percent:>3}% {} / {} at {}/s",
                    self.tag(*index),
                    human_bytes(progress.bytes_sent as f64),
                    human_bytes(progress.total as f64),
                    human_bytes(progress.bytes_per_second)
                );
                if let Some(eta) = progress.eta.filter(|_| percent < 100) {
                    line.push_str(&format!(", {}s left", eta.as_secs()));
                }
                Some(line)
            }
            RunEvent::Uploaded { index, remote_id, .. } => Some(format!(
                "{} Upload complete! Video ID: {remote_id}",
                self.tag(*index)
            )),
            RunEvent::Cataloged {
                index,
                collection_id,
                ..
            } => Some(format!(
                "{} Added to playlist {collection_id}",
                self.tag(*index)
            )),
            RunEvent::Failed {
                index,
                total,
                path,
                error,
            } => {
                self.total = *total;
                Some(format!(
                    "{} Error uploading {}: {error}",
                    self.tag(*index),
                    path.display()
                ))
            }
            RunEvent::Deleted { path, .. } => Some(format!("Deleted file: {}", path.display())),
            RunEvent::DeleteFailed { path, error, .. } => Some(format!(
                "Error deleting file {}: {error}",
                path.display()
            )),
        }
    }

    fn tag(&self, index: usize) -> String {
        format!("[{}/{}]", index + 1, self.total)
    }
}

fn human_bytes(bytes: f64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{value:.0} {}", UNITS[unit])
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
