//! Data types for an upload run.

use std::path::PathBuf;
use std::time::Duration;

use autotube_host::{Privacy, VideoMetadata};
use autotube_inventory::MediaItem;
use autotube_transfer::TransferProgress;

/// Default number of concurrent workers.
pub const DEFAULT_WORKERS: usize = 3;

/// Default number of items uploaded per run.
pub const DEFAULT_DAILY_CAP: usize = 30;

/// Per-run settings for the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadSettings {
    pub workers: usize,
    pub daily_cap: usize,
    pub description: String,
    pub tags: Vec<String>,
    pub category_id: String,
    pub privacy: Privacy,
    /// `None` means items may take as long as they need.
    pub item_timeout: Option<Duration>,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            daily_cap: DEFAULT_DAILY_CAP,
            description: "Uploaded via YouTube API".into(),
            tags: vec!["gaming".into(), "PC".into()],
            category_id: "20".into(),
            privacy: Privacy::Unlisted,
            item_timeout: None,
        }
    }
}

impl UploadSettings {
    /// Metadata for `item`, titled after its file name.
    pub fn metadata_for(&self, item: &MediaItem) -> VideoMetadata {
        VideoMetadata {
            title: item.file_name(),
            description: self.description.clone(),
            tags: self.tags.clone(),
            category_id: self.category_id.clone(),
            privacy: self.privacy,
        }
    }
}

/// Progress event emitted during a run.
///
/// `index` is the item's position in submission order, assigned at
/// dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// A worker picked up the item.
    Dispatched {
        index: usize,
        total: usize,
        path: PathBuf,
        category: String,
    },
    /// Bytes committed by the host so far.
    Progress {
        index: usize,
        progress: TransferProgress,
    },
    Uploaded {
        index: usize,
        path: PathBuf,
        remote_id: String,
    },
    Cataloged {
        index: usize,
        path: PathBuf,
        collection_id: String,
    },
    /// The item has a failed record. Also sent for items cancelled before
    /// they were dispatched, so it carries `total` too.
    Failed {
        index: usize,
        total: usize,
        path: PathBuf,
        error: String,
    },
    Deleted {
        index: usize,
        path: PathBuf,
    },
    DeleteFailed {
        index: usize,
        path: PathBuf,
        error: String,
    },
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub selected: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub deleted: usize,
    pub delete_failures: usize,
}

impl RunSummary {
    /// `true` when nothing failed. Deletion failures do not count.
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}
