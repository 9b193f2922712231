//! Persisted OAuth credential.
//!
//! The token lives in a single JSON file. Reads are served from memory;
//! writes go through one lock and replace the file atomically so two
//! refreshes can never interleave their output.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{AuthError, Session};

/// On-disk shape of the credential artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub scope: String,
}

impl StoredToken {
    pub fn session(&self) -> Session {
        Session::new(self.access_token.clone(), self.expires_at)
    }
}

/// Token store backed by a JSON file.
pub struct TokenStore {
    path: PathBuf,
    token: RwLock<Option<StoredToken>>,
    write_lock: Mutex<()>,
}

impl TokenStore {
    /// Creates a store, loading the existing token from disk if present.
    pub fn new(path: PathBuf) -> Result<Self, AuthError> {
        let token = load_token(&path)?;
        Ok(Self {
            path,
            token: RwLock::new(token),
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the current token, if any.
    pub fn get(&self) -> Option<StoredToken> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the token and persists it.
    pub fn save(&self, token: StoredToken) -> Result<(), AuthError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
        persist(&self.path, &token)
    }

    /// Forgets the token and removes the file.
    pub fn clear(&self) -> Result<(), AuthError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn load_token(path: &Path) -> Result<Option<StoredToken>, AuthError> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(path)?;
    let token: StoredToken = serde_json::from_str(&data)?;
    debug!(path = %path.display(), "loaded stored token");
    Ok(Some(token))
}

fn persist(path: &Path, token: &StoredToken) -> Result<(), AuthError> {
    let json = serde_json::to_string_pretty(token)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, json)?;
    set_permissions_0600(&tmp);
    std::fs::rename(&tmp, path)?;
    debug!(path = %path.display(), "persisted token");
    Ok(())
}

fn set_permissions_0600(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}
