//! Success-gated local deletion.

use std::path::{Path, PathBuf};

use autotube_auth::BoxFuture;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::DeletionError;
use crate::ledger::Ledger;
use crate::types::RunEvent;

/// Removes local files. Swappable so deletion failures can be exercised.
pub trait FileRemover: Send + Sync {
    fn remove<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, std::io::Result<()>>;
}

/// Deletes from the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsRemover;

impl FileRemover for FsRemover {
    fn remove<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, std::io::Result<()>> {
        Box::pin(tokio::fs::remove_file(path))
    }
}

/// What a cleanup pass did.
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub deleted: Vec<PathBuf>,
    pub failures: Vec<DeletionError>,
}

/// Deletes the local file of every successful record and nothing else.
pub struct Cleanup<R = FsRemover> {
    remover: R,
    events: Option<mpsc::Sender<RunEvent>>,
}

impl Cleanup<FsRemover> {
    pub fn new() -> Self {
        Self::with_remover(FsRemover)
    }
}

impl Default for Cleanup<FsRemover> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: FileRemover> Cleanup<R> {
    pub fn with_remover(remover: R) -> Self {
        Self {
            remover,
            events: None,
        }
    }

    /// Sends `Deleted` / `DeleteFailed` events to `events`.
    pub fn with_events(mut self, events: mpsc::Sender<RunEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Deletes files for successful records. A failed deletion is reported
    /// and skipped; records are never changed.
    pub async fn run(&self, ledger: &Ledger) -> CleanupReport {
        let mut report = CleanupReport::default();
        if ledger.is_empty() {
            debug!("nothing to clean up");
            return report;
        }

        for record in ledger.successes() {
            let path = record.item.path;
            match self.remover.remove(&path).await {
                Ok(()) => {
                    info!(path = %path.display(), "deleted local file");
                    self.emit(RunEvent::Deleted {
                        index: record.index,
                        path: path.clone(),
                    })
                    .await;
                    report.deleted.push(path);
                }
                Err(source) => {
                    warn!(path = %path.display(), error = %source, "failed to delete local file");
                    self.emit(RunEvent::DeleteFailed {
                        index: record.index,
                        path: path.clone(),
                        error: source.to_string(),
                    })
                    .await;
                    report.failures.push(DeletionError { path, source });
                }
            }
        }

        report
    }

    async fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }
}
