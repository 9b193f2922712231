//! Session acquisition for the uploader.
//!
//! The core never builds credentials itself. It is handed one
//! [`Authenticator`] and asks it for a [`Session`] whenever it is about to
//! talk to the remote host. Implementations own caching, refresh and the
//! persisted credential artifact.

mod loopback;
mod oauth;
mod store;

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Duration, Utc};

pub use oauth::{ClientSecret, ConsentHandler, OAuthAuthenticator, YOUTUBE_SCOPE};
pub use store::{StoredToken, TokenStore};

/// Boxed future returned by [`Authenticator`] methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Sessions closer than this to expiry are treated as expired.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Errors produced while acquiring or refreshing a session.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid client secret: {0}")]
    ClientSecret(String),

    #[error("token endpoint returned {status}: {body}")]
    TokenEndpoint { status: u16, body: String },

    #[error("consent failed: {0}")]
    Consent(String),
}

/// A bearer credential usable against the remote host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    /// `None` means the token does not expire.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(access_token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
        }
    }

    /// Returns `true` if the session is still usable at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at - Duration::seconds(EXPIRY_MARGIN_SECS) > now,
            None => !self.access_token.is_empty(),
        }
    }
}

/// Supplies sessions to upload workers.
///
/// Shared as `Arc<dyn Authenticator>` across all workers of a run, so
/// implementations must make refresh safe under concurrent callers.
pub trait Authenticator: Send + Sync {
    fn get_session(&self) -> BoxFuture<'_, Result<Session, AuthError>>;
}

/// Authenticator that always hands out the same session.
#[derive(Debug, Clone)]
pub struct StaticAuthenticator {
    session: Session,
}

impl StaticAuthenticator {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            session: Session::new(access_token, None),
        }
    }
}

impl Authenticator for StaticAuthenticator {
    fn get_session(&self) -> BoxFuture<'_, Result<Session, AuthError>> {
        let session = self.session.clone();
        Box::pin(async move { Ok(session) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_without_expiry_is_valid() {
        let session = Session::new("tok", None);
        assert!(session.is_valid_at(Utc::now()));
    }

    #[test]
    fn empty_session_is_invalid() {
        let session = Session::new("", None);
        assert!(!session.is_valid_at(Utc::now()));
    }

    #[test]
    fn session_inside_margin_is_expired() {
        let now = Utc::now();
        let session = Session::new("tok", Some(now + Duration::seconds(30)));
        assert!(!session.is_valid_at(now));

        let session = Session::new("tok", Some(now + Duration::seconds(600)));
        assert!(session.is_valid_at(now));
    }

    #[tokio::test]
    async fn static_authenticator_returns_token() {
        let auth = StaticAuthenticator::new("abc");
        let session = auth.get_session().await.unwrap();
        assert_eq!(session.access_token, "abc");
        assert!(session.expires_at.is_none());
    }
}
