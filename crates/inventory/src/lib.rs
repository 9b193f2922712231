//! Local capture discovery.
//!
//! Recursively walks the captures root and produces the oldest matching
//! files first, at most `limit` of them. Captures are expected to live in
//! one folder per game; that folder name becomes the item's category.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};

/// Category used when a file has no parent directory name.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Errors produced while listing candidates.
#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A discovered local file eligible for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
    pub category: String,
}

impl MediaItem {
    /// File name, used as the remote title.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }
}

/// Lists files under `root` whose extension is in `extensions`
/// (case-insensitive, without the dot), oldest modification time first,
/// truncated to `limit`.
///
/// A missing root is not an error: it yields no candidates.
pub fn list_candidates(
    root: &Path,
    extensions: &[String],
    limit: usize,
) -> Result<Vec<MediaItem>, InventoryError> {
    if !root.exists() {
        warn!(root = %root.display(), "captures root does not exist");
        return Ok(Vec::new());
    }

    let mut items = Vec::new();
    walk_dir(root, extensions, &mut items)?;

    items.sort_by(|a, b| match a.modified.cmp(&b.modified) {
        Ordering::Equal => a.path.cmp(&b.path),
        other => other,
    });
    let found = items.len();
    items.truncate(limit);

    debug!(root = %root.display(), found, selected = items.len(), limit, "listed candidates");
    Ok(items)
}

/// Category of a file: its immediate parent directory name.
pub fn derive_category(path: &Path) -> String {
    path.parent()
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| UNCATEGORIZED.to_string())
}

fn walk_dir(
    current: &Path,
    extensions: &[String],
    items: &mut Vec<MediaItem>,
) -> Result<(), InventoryError> {
    let io_err = |source| InventoryError::Io {
        path: current.to_path_buf(),
        source,
    };

    for entry in std::fs::read_dir(current).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let path = entry.path();
        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable entry");
                continue;
            }
        };

        if metadata.is_dir() {
            // A broken subtree only loses its own files.
            if let Err(e) = walk_dir(&path, extensions, items) {
                warn!(path = %path.display(), error = %e, "skipping unreadable directory");
            }
        } else if metadata.is_file() && has_extension(&path, extensions) {
            let modified = metadata.modified().map_err(|source| InventoryError::Io {
                path: path.clone(),
                source,
            })?;
            items.push(MediaItem {
                category: derive_category(&path),
                size: metadata.len(),
                modified,
                path,
            });
        }
    }

    Ok(())
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    extensions
        .iter()
        .any(|want| want.trim_start_matches('.').eq_ignore_ascii_case(ext))
}
