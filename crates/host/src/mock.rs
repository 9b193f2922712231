//! In-memory [`MediaHost`] for tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use autotube_auth::{BoxFuture, Session};

use crate::types::{
    ChunkOutcome, Collection, CollectionPage, NewCollection, UploadHandle, VideoMetadata,
};
use crate::{HostError, MediaHost};

/// Delay injected into collection listing to widen race windows.
const LIST_DELAY: Duration = Duration::from_millis(5);

#[derive(Debug)]
struct PendingUpload {
    title: String,
    size: u64,
    received: u64,
}

#[derive(Default)]
struct State {
    next_id: u64,
    uploads: HashMap<String, PendingUpload>,
    /// Completed uploads as `(remote_id, title)`.
    videos: Vec<(String, String)>,
    collections: Vec<Collection>,
    memberships: Vec<(String, String)>,
    chunk_sizes: Vec<usize>,
    create_collection_calls: usize,
    failing_titles: HashSet<String>,
    failing_memberships: bool,
    commit_limit: Option<u64>,
    open_delay: Option<Duration>,
    /// Chunk requests accepted before every further one fails.
    chunks_before_failure: Option<usize>,
    /// Token rejected once this many chunk requests have been received.
    revoke_after_chunks: Option<(String, usize)>,
    revoked_tokens: HashSet<String>,
    opens_in_flight: usize,
    max_opens_in_flight: usize,
}

impl State {
    fn next(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }
}

/// Host that keeps everything in memory and can inject failures.
///
/// The lock is never held across an await point.
#[derive(Default)]
pub struct MockHost {
    state: Mutex<State>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes upload-session creation fail for items with this title.
    pub fn fail_uploads_titled(self, title: impl Into<String>) -> Self {
        self.lock().failing_titles.insert(title.into());
        self
    }

    /// Makes every membership insert fail.
    pub fn fail_memberships(self) -> Self {
        self.lock().failing_memberships = true;
        self
    }

    /// Seeds pre-existing collections.
    pub fn with_collections(self, collections: impl IntoIterator<Item = (String, String)>) -> Self {
        self.lock().collections.extend(
            collections
                .into_iter()
                .map(|(id, title)| Collection { id, title }),
        );
        self
    }

    /// Commits at most `limit` bytes of each chunk, forcing resends.
    pub fn with_commit_limit(self, limit: u64) -> Self {
        self.lock().commit_limit = Some(limit);
        self
    }

    /// Delays every upload-session open by `delay`.
    pub fn with_open_delay(self, delay: Duration) -> Self {
        self.lock().open_delay = Some(delay);
        self
    }

    /// Accepts the first `n` chunk requests, then fails every later one
    /// with a 503.
    pub fn fail_chunk_after(self, n: usize) -> Self {
        self.lock().chunks_before_failure = Some(n);
        self
    }

    /// Rejects `token` as expired once `n` chunk requests have been received.
    pub fn revoke_token_after_chunks(self, token: impl Into<String>, n: usize) -> Self {
        self.lock().revoke_after_chunks = Some((token.into(), n));
        self
    }

    /// Highest number of upload-session opens observed in flight at once.
    pub fn max_concurrent_opens(&self) -> usize {
        self.lock().max_opens_in_flight
    }

    pub fn collections(&self) -> Vec<Collection> {
        self.lock().collections.clone()
    }

    /// Membership pairs as `(collection_id, remote_id)`.
    pub fn memberships(&self) -> Vec<(String, String)> {
        self.lock().memberships.clone()
    }

    /// Completed uploads as `(remote_id, title)`.
    pub fn videos(&self) -> Vec<(String, String)> {
        self.lock().videos.clone()
    }

    /// Payload sizes of every chunk request received.
    pub fn chunk_sizes(&self) -> Vec<usize> {
        self.lock().chunk_sizes.clone()
    }

    pub fn create_collection_calls(&self) -> usize {
        self.lock().create_collection_calls
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn authorize(&self, session: &Session) -> Result<(), HostError> {
        if self.lock().revoked_tokens.contains(&session.access_token) {
            return Err(HostError::Unauthorized);
        }
        Ok(())
    }

    fn open(&self, metadata: &VideoMetadata, size: u64) -> Result<UploadHandle, HostError> {
        let mut state = self.lock();
        if state.failing_titles.contains(&metadata.title) {
            return Err(HostError::Api {
                status: 500,
                body: format!("injected failure for {}", metadata.title),
            });
        }
        let handle = state.next("upload");
        state.uploads.insert(
            handle.clone(),
            PendingUpload {
                title: metadata.title.clone(),
                size,
                received: 0,
            },
        );
        Ok(UploadHandle(handle))
    }

    fn accept_chunk(
        &self,
        handle: &UploadHandle,
        offset: u64,
        data: &[u8],
        total: u64,
    ) -> Result<ChunkOutcome, HostError> {
        let mut state = self.lock();
        state.chunk_sizes.push(data.len());
        let received_chunks = state.chunk_sizes.len();
        if let Some((token, n)) = state.revoke_after_chunks.clone() {
            if received_chunks >= n {
                state.revoked_tokens.insert(token);
            }
        }
        if state.chunks_before_failure.is_some_and(|n| received_chunks > n) {
            return Err(HostError::Api {
                status: 503,
                body: "injected chunk failure".into(),
            });
        }
        let limit = state.commit_limit;

        let upload = state
            .uploads
            .get_mut(handle.as_str())
            .ok_or_else(|| HostError::Protocol(format!("unknown upload {}", handle.as_str())))?;
        if total != upload.size {
            return Err(HostError::Protocol(format!(
                "total {total} does not match declared size {}",
                upload.size
            )));
        }
        if offset != upload.received {
            return Err(HostError::Protocol(format!(
                "offset {offset} does not match committed {}",
                upload.received
            )));
        }

        let mut accepted = data.len() as u64;
        if let Some(limit) = limit {
            accepted = accepted.min(limit);
        }
        upload.received += accepted;

        if upload.received < upload.size {
            return Ok(ChunkOutcome::Progress {
                committed: upload.received,
            });
        }

        let title = upload.title.clone();
        state.uploads.remove(handle.as_str());
        let remote_id = state.next("vid");
        state.videos.push((remote_id.clone(), title));
        Ok(ChunkOutcome::Complete { remote_id })
    }

    fn page(&self, page_size: u32, page_token: Option<&str>) -> Result<CollectionPage, HostError> {
        let start = match page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| HostError::Protocol(format!("bad page token {token}")))?,
            None => 0,
        };
        let state = self.lock();
        let end = (start + page_size.max(1) as usize).min(state.collections.len());
        let items = state.collections.get(start..end).unwrap_or_default().to_vec();
        let next_page_token = (end < state.collections.len()).then(|| end.to_string());
        Ok(CollectionPage {
            items,
            next_page_token,
        })
    }

    fn insert_collection(&self, collection: &NewCollection) -> String {
        let mut state = self.lock();
        state.create_collection_calls += 1;
        let id = state.next("coll");
        state.collections.push(Collection {
            id: id.clone(),
            title: collection.title.clone(),
        });
        id
    }

    fn insert_membership(&self, collection_id: &str, remote_id: &str) -> Result<(), HostError> {
        let mut state = self.lock();
        if state.failing_memberships {
            return Err(HostError::Api {
                status: 500,
                body: "injected membership failure".into(),
            });
        }
        if !state.collections.iter().any(|c| c.id == collection_id) {
            return Err(HostError::Api {
                status: 404,
                body: format!("playlist {collection_id} not found"),
            });
        }
        state
            .memberships
            .push((collection_id.to_string(), remote_id.to_string()));
        Ok(())
    }
}

impl MediaHost for MockHost {
    fn create_upload_session<'a>(
        &'a self,
        session: &'a Session,
        metadata: &'a VideoMetadata,
        size: u64,
    ) -> BoxFuture<'a, Result<UploadHandle, HostError>> {
        Box::pin(async move {
            self.authorize(session)?;
            let delay = {
                let mut state = self.lock();
                state.opens_in_flight += 1;
                state.max_opens_in_flight = state.max_opens_in_flight.max(state.opens_in_flight);
                state.open_delay
            };
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.lock().opens_in_flight -= 1;
            self.open(metadata, size)
        })
    }

    fn send_chunk<'a>(
        &'a self,
        session: &'a Session,
        handle: &'a UploadHandle,
        offset: u64,
        data: Vec<u8>,
        total: u64,
    ) -> BoxFuture<'a, Result<ChunkOutcome, HostError>> {
        Box::pin(async move {
            self.authorize(session)?;
            self.accept_chunk(handle, offset, &data, total)
        })
    }

    fn list_collections<'a>(
        &'a self,
        session: &'a Session,
        page_size: u32,
        page_token: Option<&'a str>,
    ) -> BoxFuture<'a, Result<CollectionPage, HostError>> {
        Box::pin(async move {
            self.authorize(session)?;
            tokio::time::sleep(LIST_DELAY).await;
            self.page(page_size, page_token)
        })
    }

    fn create_collection<'a>(
        &'a self,
        session: &'a Session,
        collection: &'a NewCollection,
    ) -> BoxFuture<'a, Result<String, HostError>> {
        Box::pin(async move {
            self.authorize(session)?;
            Ok(self.insert_collection(collection))
        })
    }

    fn add_membership<'a>(
        &'a self,
        session: &'a Session,
        collection_id: &'a str,
        remote_id: &'a str,
    ) -> BoxFuture<'a, Result<(), HostError>> {
        Box::pin(async move {
            self.authorize(session)?;
            self.insert_membership(collection_id, remote_id)
        })
    }
}
