//! Upload orchestrator.
//!
//! Dispatches one task per item onto a fixed-size worker pool. Each task
//! transfers the file, catalogs it, and writes exactly one record to the
//! [`Ledger`]. A session is requested from the shared authenticator before
//! every host call, so long transfers pick up refreshed tokens. A failing
//! item never stops its siblings.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use autotube_auth::Authenticator;
use autotube_catalog::CatalogManager;
use autotube_inventory::MediaItem;
use autotube_transfer::{TransferEngine, TransferError, TransferProgress};
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{ItemError, RunError};
use crate::ledger::{CompletionRecord, Ledger, Outcome};
use crate::types::{RunEvent, UploadSettings};

/// A failed item, with the remote id if the transfer got that far.
struct Failure {
    remote_id: Option<String>,
    error: ItemError,
}

impl From<ItemError> for Failure {
    fn from(error: ItemError) -> Self {
        Self {
            remote_id: None,
            error,
        }
    }
}

impl From<TransferError> for Failure {
    fn from(error: TransferError) -> Self {
        match error {
            TransferError::Auth(e) => ItemError::Auth(e).into(),
            e => ItemError::Transfer(e).into(),
        }
    }
}

/// State shared by every worker of a run.
struct Shared {
    auth: Arc<dyn Authenticator>,
    engine: TransferEngine,
    catalog: Arc<CatalogManager>,
    settings: UploadSettings,
    events: Option<mpsc::Sender<RunEvent>>,
    ledger: Arc<Ledger>,
    total: usize,
}

/// Runs items through transfer and cataloging with bounded concurrency.
pub struct Orchestrator {
    auth: Arc<dyn Authenticator>,
    engine: TransferEngine,
    catalog: Arc<CatalogManager>,
    settings: UploadSettings,
    events: Option<mpsc::Sender<RunEvent>>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        auth: Arc<dyn Authenticator>,
        engine: TransferEngine,
        catalog: Arc<CatalogManager>,
        settings: UploadSettings,
    ) -> Self {
        Self {
            auth,
            engine,
            catalog,
            settings,
            events: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Sends [`RunEvent`]s to `events`. Progress events are dropped rather
    /// than waited on when the channel is full.
    pub fn with_events(mut self, events: mpsc::Sender<RunEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Returns a token that cancels this orchestrator's runs.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Processes `items` in submission order and returns once every item
    /// has a record.
    ///
    /// Fails only if no session can be obtained before dispatch.
    pub async fn run(&self, mut items: Vec<MediaItem>) -> Result<Arc<Ledger>, RunError> {
        if items.len() > self.settings.daily_cap {
            warn!(
                candidates = items.len(),
                daily_cap = self.settings.daily_cap,
                "dropping candidates over the daily cap"
            );
            items.truncate(self.settings.daily_cap);
        }

        self.auth.get_session().await?;

        let total = items.len();
        let ledger = Arc::new(Ledger::new());
        let shared = Arc::new(Shared {
            auth: Arc::clone(&self.auth),
            engine: self.engine.clone(),
            catalog: Arc::clone(&self.catalog),
            settings: self.settings.clone(),
            events: self.events.clone(),
            ledger: Arc::clone(&ledger),
            total,
        });

        let workers = self.settings.workers.max(1);
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut handles = Vec::with_capacity(total);
        info!(items = total, workers, "starting upload run");

        for (index, item) in items.into_iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                shared.finish(index, item, Err(ItemError::Cancelled.into())).await;
                continue;
            };

            let worker = Arc::clone(&shared);
            let cancel = self.cancel.clone();
            let task_item = item.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                worker.run_item(index, task_item, cancel).await;
            });
            handles.push((index, item, handle));
        }

        for (index, item, handle) in handles {
            if let Err(e) = handle.await {
                error!(index, path = %item.path.display(), error = %e, "worker task aborted");
                if !shared.ledger.contains(index) {
                    shared
                        .finish(index, item, Err(ItemError::Task(e.to_string()).into()))
                        .await;
                }
            }
        }

        info!(
            succeeded = ledger.succeeded(),
            failed = ledger.failed(),
            "upload run finished"
        );
        Ok(ledger)
    }
}

impl Shared {
    async fn run_item(&self, index: usize, item: MediaItem, cancel: CancellationToken) {
        self.emit(RunEvent::Dispatched {
            index,
            total: self.total,
            path: item.path.clone(),
            category: item.category.clone(),
        })
        .await;

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(ItemError::Cancelled.into()),
            result = with_timeout(self.settings.item_timeout, self.process(index, &item)) => result,
        };
        self.finish(index, item, result).await;
    }

    async fn process(&self, index: usize, item: &MediaItem) -> Result<(String, String), Failure> {
        let metadata = self.settings.metadata_for(item);
        debug!(index, path = %item.path.display(), size = item.size, "uploading");

        let events = self.events.clone();
        let on_progress = move |p: TransferProgress| {
            if let Some(tx) = &events {
                let _ = tx.try_send(RunEvent::Progress { index, progress: p });
            }
        };
        let remote_id = self
            .engine
            .upload(self.auth.as_ref(), &item.path, &metadata, &on_progress)
            .await?;
        self.emit(RunEvent::Uploaded {
            index,
            path: item.path.clone(),
            remote_id: remote_id.clone(),
        })
        .await;

        let cataloged = async {
            let session = self.auth.get_session().await?;
            let collection_id = self
                .catalog
                .resolve_category(&session, &item.category)
                .await?;
            let session = self.auth.get_session().await?;
            self.catalog
                .add_membership(&session, &collection_id, &remote_id)
                .await?;
            Ok::<_, ItemError>(collection_id)
        }
        .await;

        match cataloged {
            Ok(collection_id) => {
                self.emit(RunEvent::Cataloged {
                    index,
                    path: item.path.clone(),
                    collection_id: collection_id.clone(),
                })
                .await;
                Ok((remote_id, collection_id))
            }
            Err(error) => Err(Failure {
                remote_id: Some(remote_id),
                error,
            }),
        }
    }

    /// Writes the item's record and reports failures.
    async fn finish(&self, index: usize, item: MediaItem, result: Result<(String, String), Failure>) {
        let outcome = match result {
            Ok((remote_id, collection_id)) => {
                info!(
                    index,
                    path = %item.path.display(),
                    %remote_id,
                    %collection_id,
                    "item complete"
                );
                Outcome::Success {
                    remote_id,
                    collection_id,
                }
            }
            Err(Failure { remote_id, error }) => {
                error!(index, path = %item.path.display(), error = %error, "item failed");
                self.emit(RunEvent::Failed {
                    index,
                    total: self.total,
                    path: item.path.clone(),
                    error: error.to_string(),
                })
                .await;
                Outcome::Failed {
                    remote_id,
                    error: Arc::new(error),
                }
            }
        };

        if let Err(e) = self.ledger.record(CompletionRecord {
            index,
            item,
            outcome,
        }) {
            error!(error = %e, "completion record rejected");
        }
    }

    async fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }
}

async fn with_timeout<F>(limit: Option<Duration>, work: F) -> Result<(String, String), Failure>
where
    F: Future<Output = Result<(String, String), Failure>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, work)
            .await
            .unwrap_or_else(|_| Err(ItemError::Timeout(limit).into())),
        None => work.await,
    }
}
