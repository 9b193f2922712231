use std::io::SeekFrom;
use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::TransferError;
use crate::types::ChunkPolicy;

/// Reads slices of a file according to a [`ChunkPolicy`].
///
/// Slices are addressed by offset so the engine can resend from whatever
/// the host reports as committed.
pub struct ChunkSource {
    file: tokio::fs::File,
    size: u64,
    policy: ChunkPolicy,
    position: u64,
}

impl ChunkSource {
    /// Opens `path` and records its size.
    pub async fn open(path: &Path, policy: ChunkPolicy) -> Result<Self, TransferError> {
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        Ok(Self {
            file,
            size,
            policy,
            position: 0,
        })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Reads the slice starting at `offset`. Empty at or past the end.
    pub async fn read_at(&mut self, offset: u64) -> Result<Vec<u8>, TransferError> {
        let len = self.policy.slice_len(offset, self.size);
        if len == 0 {
            return Ok(Vec::new());
        }

        if self.position != offset {
            self.file.seek(SeekFrom::Start(offset)).await?;
            self.position = offset;
        }

        let mut buf = vec![0u8; len as usize];
        // A file truncated after open surfaces as UnexpectedEof.
        self.file.read_exact(&mut buf).await?;
        self.position += len;
        Ok(buf)
    }
}
