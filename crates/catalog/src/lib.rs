//! Category collections on the remote host.
//!
//! [`CatalogManager::resolve_category`] maps a category title to exactly one
//! remote collection per run, even when many workers ask for the same new
//! title at once: each title has its own async lock, and whoever holds it
//! does the list-then-create while the others wait and reuse the result.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use autotube_auth::Session;
use autotube_host::{HostError, HostHandle, NewCollection, Privacy};
use tracing::{debug, info, warn};

/// Default `maxResults` for collection listing.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Errors from collection resolution or membership insertion.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to resolve collection {title:?}: {source}")]
    Resolve {
        title: String,
        #[source]
        source: HostError,
    },

    #[error("failed to add {remote_id} to collection {collection_id}: {source}")]
    Membership {
        collection_id: String,
        remote_id: String,
        #[source]
        source: HostError,
    },
}

/// Slot holding the resolved id of one title once known.
type TitleSlot = Arc<tokio::sync::Mutex<Option<String>>>;

/// Resolves categories to collections and records memberships.
pub struct CatalogManager {
    host: HostHandle,
    page_size: u32,
    privacy: Privacy,
    titles: Mutex<HashMap<String, TitleSlot>>,
    memberships: Mutex<HashSet<(String, String)>>,
}

impl CatalogManager {
    pub fn new(host: HostHandle) -> Self {
        Self {
            host,
            page_size: DEFAULT_PAGE_SIZE,
            privacy: Privacy::Private,
            titles: Mutex::new(HashMap::new()),
            memberships: Mutex::new(HashSet::new()),
        }
    }

    /// Sets the listing page size (clamped to at least 1).
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Sets the visibility of newly created collections.
    pub fn with_privacy(mut self, privacy: Privacy) -> Self {
        self.privacy = privacy;
        self
    }

    /// Returns the collection id for `title`, creating the collection if no
    /// exact-title match exists.
    ///
    /// Concurrent calls for the same title converge on one id. A failed
    /// attempt leaves the title unresolved so a later call retries.
    pub async fn resolve_category(
        &self,
        session: &Session,
        title: &str,
    ) -> Result<String, CatalogError> {
        let slot = self.slot(title);
        let mut resolved = slot.lock().await;
        if let Some(id) = resolved.as_ref() {
            return Ok(id.clone());
        }

        let id = self
            .find_or_create(session, title)
            .await
            .map_err(|source| CatalogError::Resolve {
                title: title.to_string(),
                source,
            })?;
        *resolved = Some(id.clone());
        Ok(id)
    }

    /// Adds `remote_id` to `collection_id`. Repeated calls for the same pair
    /// are skipped.
    pub async fn add_membership(
        &self,
        session: &Session,
        collection_id: &str,
        remote_id: &str,
    ) -> Result<(), CatalogError> {
        let pair = (collection_id.to_string(), remote_id.to_string());
        let inserted = lock(&self.memberships).insert(pair.clone());
        if !inserted {
            debug!(collection_id, remote_id, "membership already recorded, skipping");
            return Ok(());
        }

        if let Err(source) = self
            .host
            .add_membership(session, collection_id, remote_id)
            .await
        {
            lock(&self.memberships).remove(&pair);
            return Err(CatalogError::Membership {
                collection_id: pair.0,
                remote_id: pair.1,
                source,
            });
        }
        debug!(collection_id, remote_id, "membership added");
        Ok(())
    }

    fn slot(&self, title: &str) -> TitleSlot {
        Arc::clone(lock(&self.titles).entry(title.to_string()).or_default())
    }

    async fn find_or_create(&self, session: &Session, title: &str) -> Result<String, HostError> {
        if let Some(id) = self.find(session, title).await? {
            debug!(title, id = %id, "found existing collection");
            return Ok(id);
        }

        let id = self
            .host
            .create_collection(
                session,
                &NewCollection {
                    title: title.to_string(),
                    description: format!("Auto-created playlist for {title}"),
                    privacy: self.privacy,
                },
            )
            .await?;
        info!(title, id = %id, "created collection");
        Ok(id)
    }

    /// Pages through the caller's collections looking for an exact title.
    async fn find(&self, session: &Session, title: &str) -> Result<Option<String>, HostError> {
        let mut page_token: Option<String> = None;
        let mut seen_tokens = HashSet::new();

        loop {
            let page = self
                .host
                .list_collections(session, self.page_size, page_token.as_deref())
                .await?;
            if let Some(found) = page.items.into_iter().find(|c| c.title == title) {
                return Ok(Some(found.id));
            }

            match page.next_page_token {
                Some(next) if seen_tokens.insert(next.clone()) => page_token = Some(next),
                Some(next) => {
                    warn!(title, token = %next, "collection listing repeated a page token");
                    return Ok(None);
                }
                None => return Ok(None),
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
