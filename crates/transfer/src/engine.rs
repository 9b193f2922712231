use std::path::Path;
use std::time::Duration;

use autotube_auth::{Authenticator, Session};
use autotube_host::{ChunkOutcome, HostHandle, UploadHandle, VideoMetadata};
use tracing::{debug, info, trace, warn};

use crate::chunked::ChunkSource;
use crate::progress::{SpeedCalculator, TransferProgress};
use crate::types::{ChunkPolicy, TransferSession};
use crate::{MAX_STALLED_CHUNKS, TransferError};

/// Drives resumable uploads against a [`MediaHost`](autotube_host::MediaHost).
#[derive(Clone)]
pub struct TransferEngine {
    host: HostHandle,
    policy: ChunkPolicy,
}

impl TransferEngine {
    pub fn new(host: HostHandle, policy: ChunkPolicy) -> Self {
        Self { host, policy }
    }

    /// Uploads the file at `path` and returns its remote identifier.
    ///
    /// A session is requested from `auth` before the open and before every
    /// chunk, so a token that expires mid-transfer is refreshed.
    /// `on_progress` is called after every chunk the host acknowledges.
    /// Any error leaves nothing to resume: the next attempt starts over.
    pub async fn upload(
        &self,
        auth: &dyn Authenticator,
        path: &Path,
        metadata: &VideoMetadata,
        on_progress: &(dyn Fn(TransferProgress) + Send + Sync),
    ) -> Result<String, TransferError> {
        let mut source = ChunkSource::open(path, self.policy).await?;
        let mut transfer = TransferSession::new(path, source.size());

        match self
            .drive(auth, &mut source, &mut transfer, metadata, on_progress)
            .await
        {
            Ok(remote_id) => Ok(remote_id),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    bytes_sent = transfer.bytes_sent(),
                    error = %e,
                    "transfer failed"
                );
                transfer.fail(e.to_string());
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        auth: &dyn Authenticator,
        source: &mut ChunkSource,
        transfer: &mut TransferSession,
        metadata: &VideoMetadata,
        on_progress: &(dyn Fn(TransferProgress) + Send + Sync),
    ) -> Result<String, TransferError> {
        let total = transfer.size();
        let session = auth.get_session().await?;
        let handle = self
            .host
            .create_upload_session(&session, metadata, total)
            .await?;
        debug!(path = %transfer.path().display(), total, policy = ?self.policy, "upload session opened");

        let mut speed = SpeedCalculator::default();
        speed.add_sample(0);
        let mut stalled = 0u32;

        loop {
            let offset = transfer.bytes_sent();
            let data = source.read_at(offset).await?;
            let end = offset + data.len() as u64;

            let session = auth.get_session().await?;
            match self.send(&session, &handle, offset, data, total).await? {
                ChunkOutcome::Progress { committed } => {
                    if committed > end {
                        return Err(TransferError::Protocol(format!(
                            "host committed {committed} bytes but only {end} were sent"
                        )));
                    }
                    transfer.record_progress(committed)?;

                    if committed == offset {
                        stalled += 1;
                        if stalled >= MAX_STALLED_CHUNKS {
                            return Err(TransferError::Stalled { offset });
                        }
                    } else {
                        stalled = 0;
                        speed.add_sample(committed - offset);
                    }

                    trace!(committed, total, "chunk acknowledged");
                    on_progress(TransferProgress {
                        bytes_sent: committed,
                        total,
                        bytes_per_second: speed.bytes_per_second(),
                        eta: speed.eta(total - committed),
                    });
                }
                ChunkOutcome::Complete { remote_id } => {
                    if end != total {
                        return Err(TransferError::Protocol(format!(
                            "host reported completion after {end} of {total} bytes"
                        )));
                    }
                    transfer.complete(remote_id.clone())?;
                    speed.add_sample(end - offset);
                    on_progress(TransferProgress {
                        bytes_sent: total,
                        total,
                        bytes_per_second: speed.bytes_per_second(),
                        eta: Some(Duration::ZERO),
                    });
                    info!(path = %transfer.path().display(), %remote_id, total, "transfer complete");
                    return Ok(remote_id);
                }
            }
        }
    }

    async fn send(
        &self,
        session: &Session,
        handle: &UploadHandle,
        offset: u64,
        data: Vec<u8>,
        total: u64,
    ) -> Result<ChunkOutcome, TransferError> {
        Ok(self
            .host
            .send_chunk(session, handle, offset, data, total)
            .await?)
    }
}
