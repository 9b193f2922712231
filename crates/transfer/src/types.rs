use std::path::{Path, PathBuf};

use crate::{DEFAULT_CHUNK_SIZE, TransferError};

/// How much of the file each request carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkPolicy {
    /// At most this many bytes per request.
    Fixed(usize),
    /// The whole remainder of the file in one request.
    Unbounded,
}

impl ChunkPolicy {
    /// Builds a policy from the `chunked` / `chunk_size` settings.
    ///
    /// A zero `chunk_size` falls back to [`DEFAULT_CHUNK_SIZE`].
    pub fn from_settings(chunked: bool, chunk_size: usize) -> Self {
        match (chunked, chunk_size) {
            (false, _) => ChunkPolicy::Unbounded,
            (true, 0) => ChunkPolicy::Fixed(DEFAULT_CHUNK_SIZE),
            (true, n) => ChunkPolicy::Fixed(n),
        }
    }

    /// Length of the slice starting at `offset` of a `size`-byte file.
    pub fn slice_len(self, offset: u64, size: u64) -> u64 {
        let remaining = size.saturating_sub(offset);
        match self {
            ChunkPolicy::Fixed(n) => remaining.min(n as u64),
            ChunkPolicy::Unbounded => remaining,
        }
    }
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        ChunkPolicy::Fixed(DEFAULT_CHUNK_SIZE)
    }
}

/// Lifecycle of one item's transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferState {
    Init,
    ChunkSent { bytes_sent: u64 },
    Complete { remote_id: String },
    Failed { reason: String },
}

/// Transfer state of a single item.
///
/// Owned by the worker processing the item; never shared. `bytes_sent`
/// only moves forward and a terminal state is final.
#[derive(Debug)]
pub struct TransferSession {
    path: PathBuf,
    size: u64,
    state: TransferState,
}

impl TransferSession {
    pub fn new(path: &Path, size: u64) -> Self {
        Self {
            path: path.to_path_buf(),
            size,
            state: TransferState::Init,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn state(&self) -> &TransferState {
        &self.state
    }

    /// Bytes the host has committed so far.
    pub fn bytes_sent(&self) -> u64 {
        match &self.state {
            TransferState::Init | TransferState::Failed { .. } => 0,
            TransferState::ChunkSent { bytes_sent } => *bytes_sent,
            TransferState::Complete { .. } => self.size,
        }
    }

    pub fn remote_id(&self) -> Option<&str> {
        match &self.state {
            TransferState::Complete { remote_id } => Some(remote_id),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            TransferState::Complete { .. } | TransferState::Failed { .. }
        )
    }

    /// Records the host's committed byte count after a chunk.
    pub fn record_progress(&mut self, committed: u64) -> Result<(), TransferError> {
        self.ensure_open()?;
        let sent = self.bytes_sent();
        if committed < sent {
            return Err(TransferError::Protocol(format!(
                "committed bytes went backwards: {sent} -> {committed}"
            )));
        }
        if committed > self.size {
            return Err(TransferError::Protocol(format!(
                "committed {committed} bytes of a {}-byte file",
                self.size
            )));
        }
        self.state = TransferState::ChunkSent {
            bytes_sent: committed,
        };
        Ok(())
    }

    /// Moves to `Complete`.
    pub fn complete(&mut self, remote_id: String) -> Result<(), TransferError> {
        self.ensure_open()?;
        if remote_id.is_empty() {
            return Err(TransferError::Protocol("empty remote id".into()));
        }
        self.state = TransferState::Complete { remote_id };
        Ok(())
    }

    /// Moves to `Failed`, discarding partial progress. No-op once terminal.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if !self.is_terminal() {
            self.state = TransferState::Failed {
                reason: reason.into(),
            };
        }
    }

    fn ensure_open(&self) -> Result<(), TransferError> {
        if self.is_terminal() {
            return Err(TransferError::Protocol(format!(
                "transfer of {} already finished",
                self.path.display()
            )));
        }
        Ok(())
    }
}
