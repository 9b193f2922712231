//! Completion ledger: one terminal record per item, written once.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use autotube_inventory::MediaItem;

use crate::error::{DuplicateRecord, ItemError};

/// Terminal outcome of one item.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Transferred and cataloged; the local file may be deleted.
    Success {
        remote_id: String,
        collection_id: String,
    },
    /// Some stage failed. `remote_id` is set when the transfer itself had
    /// already succeeded.
    Failed {
        remote_id: Option<String>,
        error: Arc<ItemError>,
    },
}

/// Outcome of one item in one run.
#[derive(Debug, Clone)]
pub struct CompletionRecord {
    pub index: usize,
    pub item: MediaItem,
    pub outcome: Outcome,
}

impl CompletionRecord {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    pub fn remote_id(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Success { remote_id, .. } => Some(remote_id),
            Outcome::Failed { remote_id, .. } => remote_id.as_deref(),
        }
    }

    pub fn error(&self) -> Option<&ItemError> {
        match &self.outcome {
            Outcome::Success { .. } => None,
            Outcome::Failed { error, .. } => Some(error),
        }
    }
}

/// Append-only map from item index to its [`CompletionRecord`].
#[derive(Debug, Default)]
pub struct Ledger {
    records: Mutex<BTreeMap<usize, CompletionRecord>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `record`. An existing record for the same index is never
    /// overwritten.
    pub fn record(&self, record: CompletionRecord) -> Result<(), DuplicateRecord> {
        let mut records = self.lock();
        if records.contains_key(&record.index) {
            return Err(DuplicateRecord {
                index: record.index,
            });
        }
        records.insert(record.index, record);
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<CompletionRecord> {
        self.lock().get(&index).cloned()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.lock().contains_key(&index)
    }

    /// All records in submission order.
    pub fn records(&self) -> Vec<CompletionRecord> {
        self.lock().values().cloned().collect()
    }

    /// Successful records in submission order.
    pub fn successes(&self) -> Vec<CompletionRecord> {
        self.lock()
            .values()
            .filter(|r| r.is_success())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.lock().values().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.lock().values().filter(|r| !r.is_success()).count()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<usize, CompletionRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
