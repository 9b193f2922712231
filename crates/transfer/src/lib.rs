//! Resumable chunked transfer with progress tracking.
//!
//! One [`TransferEngine`] is shared by all workers; each call to
//! [`TransferEngine::upload`] owns its own [`TransferSession`] and drives it
//! `Init -> ChunkSent* -> Complete | Failed`.

mod chunked;
mod engine;
mod progress;
mod types;

pub use chunked::ChunkSource;
pub use engine::TransferEngine;
pub use progress::{SpeedCalculator, TransferProgress};
pub use types::{ChunkPolicy, TransferSession, TransferState};

use autotube_auth::AuthError;
use autotube_host::HostError;

/// Default chunk size: 8 MiB.
///
/// YouTube requires chunk sizes to be multiples of 256 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Consecutive chunk responses without new committed bytes before giving up.
pub const MAX_STALLED_CHUNKS: u32 = 3;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("host error: {0}")]
    Host(#[from] HostError),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("host stopped committing bytes at offset {offset}")]
    Stalled { offset: u64 },
}
