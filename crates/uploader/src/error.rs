//! Uploader error types.

use std::path::PathBuf;
use std::time::Duration;

use autotube_auth::AuthError;
use autotube_catalog::CatalogError;
use autotube_transfer::TransferError;

/// Why a single item failed. Never aborts other items.
#[derive(Debug, thiserror::Error)]
pub enum ItemError {
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("transfer failed: {0}")]
    Transfer(#[from] TransferError),

    #[error("cataloging failed: {0}")]
    Catalog(#[from] CatalogError),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,

    #[error("worker task failed: {0}")]
    Task(String),
}

/// Errors that stop a run before any item is dispatched.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("no usable session: {0}")]
    Auth(#[from] AuthError),
}

/// A second write for an item already in the ledger.
#[derive(Debug, thiserror::Error)]
#[error("item {index} already has a completion record")]
pub struct DuplicateRecord {
    pub index: usize,
}

/// Failure removing a local file after a successful upload.
#[derive(Debug, thiserror::Error)]
#[error("failed to delete {path}: {source}")]
pub struct DeletionError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}
