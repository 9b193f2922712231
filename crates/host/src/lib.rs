//! Remote media host contract.
//!
//! The uploader talks to the hosting service only through [`MediaHost`].
//! [`YouTubeClient`] implements it over the YouTube Data API v3; the
//! `mock` feature adds an in-memory [`MockHost`] for tests.

mod error;
#[cfg(feature = "mock")]
mod mock;
mod types;
mod youtube;

use std::sync::Arc;

use autotube_auth::{BoxFuture, Session};

pub use error::HostError;
#[cfg(feature = "mock")]
pub use mock::MockHost;
pub use types::{
    ChunkOutcome, Collection, CollectionPage, NewCollection, Privacy, UploadHandle,
    VideoMetadata,
};
pub use youtube::YouTubeClient;

/// Shared handle to a host implementation.
pub type HostHandle = Arc<dyn MediaHost>;

/// Operations the uploader needs from the hosting service.
///
/// Every call is authenticated with the [`Session`] passed in; the host
/// never acquires credentials itself.
pub trait MediaHost: Send + Sync {
    /// Opens a resumable upload for a file of `size` bytes.
    fn create_upload_session<'a>(
        &'a self,
        session: &'a Session,
        metadata: &'a VideoMetadata,
        size: u64,
    ) -> BoxFuture<'a, Result<UploadHandle, HostError>>;

    /// Sends `data` starting at byte `offset` of a `total`-byte file.
    ///
    /// Returns how many bytes the host has committed so far, or the remote
    /// identifier once the upload is complete.
    fn send_chunk<'a>(
        &'a self,
        session: &'a Session,
        handle: &'a UploadHandle,
        offset: u64,
        data: Vec<u8>,
        total: u64,
    ) -> BoxFuture<'a, Result<ChunkOutcome, HostError>>;

    /// Lists one page of the caller's collections.
    fn list_collections<'a>(
        &'a self,
        session: &'a Session,
        page_size: u32,
        page_token: Option<&'a str>,
    ) -> BoxFuture<'a, Result<CollectionPage, HostError>>;

    /// Creates a collection and returns its identifier.
    fn create_collection<'a>(
        &'a self,
        session: &'a Session,
        collection: &'a NewCollection,
    ) -> BoxFuture<'a, Result<String, HostError>>;

    /// Appends an uploaded item to a collection.
    fn add_membership<'a>(
        &'a self,
        session: &'a Session,
        collection_id: &'a str,
        remote_id: &'a str,
    ) -> BoxFuture<'a, Result<(), HostError>>;
}
