//! OAuth 2.0 authenticator for Google APIs.
//!
//! Sessions are cached in memory behind an async mutex. Only one caller
//! at a time may refresh or run the consent flow; everyone else waits on
//! the mutex and then reuses whatever the first caller stored.

use std::path::Path;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{Duration, Utc};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::store::{StoredToken, TokenStore};
use crate::{AuthError, Authenticator, BoxFuture, Session, loopback};

/// Scope needed to upload videos and manage playlists.
pub const YOUTUBE_SCOPE: &str = "https://www.googleapis.com/auth/youtube";

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Called with the consent URL when the user has to authorize the app.
pub type ConsentHandler = Box<dyn Fn(&str) + Send + Sync>;

/// OAuth client credentials, as downloaded from the Google console.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.into()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.into()
}

#[derive(Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

impl ClientSecret {
    /// Parses a `client_secret.json` document (`installed` or `web` section).
    pub fn from_json(json: &str) -> Result<Self, AuthError> {
        let file: ClientSecretFile = serde_json::from_str(json)?;
        file.installed
            .or(file.web)
            .ok_or_else(|| AuthError::ClientSecret("missing `installed` or `web` section".into()))
    }

    pub fn load(path: &Path) -> Result<Self, AuthError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            AuthError::ClientSecret(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

/// Authenticator backed by a refreshable OAuth token.
pub struct OAuthAuthenticator {
    http: reqwest::Client,
    secret: ClientSecret,
    store: Arc<TokenStore>,
    scope: String,
    cached: Mutex<Option<Session>>,
    consent: ConsentHandler,
}

impl OAuthAuthenticator {
    pub fn new(secret: ClientSecret, store: Arc<TokenStore>) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            secret,
            store,
            scope: YOUTUBE_SCOPE.into(),
            cached: Mutex::new(None),
            consent: Box::new(|url| {
                warn!(%url, "authorization required, open this URL in a browser");
            }),
        })
    }

    /// Replaces the handler that presents the consent URL to the user.
    pub fn with_consent_handler(mut self, handler: ConsentHandler) -> Self {
        self.consent = handler;
        self
    }

    async fn session(&self) -> Result<Session, AuthError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();
        if let Some(session) = cached.as_ref()
            && session.is_valid_at(now)
        {
            return Ok(session.clone());
        }

        let token = match self.store.get() {
            Some(token) if token.session().is_valid_at(now) => token,
            Some(StoredToken {
                refresh_token: Some(refresh),
                ..
            }) => self.refresh(&refresh).await?,
            _ => self.authorize().await?,
        };

        let session = token.session();
        *cached = Some(session.clone());
        Ok(session)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<StoredToken, AuthError> {
        debug!("refreshing access token");
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.secret.client_id.as_str()),
            ("client_secret", self.secret.client_secret.as_str()),
        ];
        let resp = self.token_request(&params).await?;
        let token = self.stored_token(resp, Some(refresh_token));
        self.store.save(token.clone())?;
        info!("access token refreshed");
        Ok(token)
    }

    async fn authorize(&self) -> Result<StoredToken, AuthError> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let redirect_uri = format!("http://127.0.0.1:{}", listener.local_addr()?.port());

        let verifier = format!(
            "{}{}",
            uuid::Uuid::new_v4().simple(),
            uuid::Uuid::new_v4().simple()
        );
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        let state = uuid::Uuid::new_v4().simple().to_string();

        let url = self.consent_url(&redirect_uri, &state, &challenge);
        (self.consent)(&url);

        let code = loopback::wait_for_code(&listener, &state).await?;
        debug!("received authorization code");

        let params = [
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("client_id", self.secret.client_id.as_str()),
            ("client_secret", self.secret.client_secret.as_str()),
            ("code_verifier", verifier.as_str()),
        ];
        let resp = self.token_request(&params).await?;
        let token = self.stored_token(resp, None);
        self.store.save(token.clone())?;
        info!(path = %self.store.path().display(), "authorization stored");
        Ok(token)
    }

    fn consent_url(&self, redirect_uri: &str, state: &str, challenge: &str) -> String {
        let params = [
            ("client_id", self.secret.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", self.scope.as_str()),
            ("state", state),
            ("code_challenge", challenge),
            ("code_challenge_method", "S256"),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ];
        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={}", utf8_percent_encode(v, NON_ALPHANUMERIC)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{query}", self.secret.auth_uri)
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenResponse, AuthError> {
        let resp = self
            .http
            .post(&self.secret.token_uri)
            .form(params)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::TokenEndpoint {
                status: status.as_u16(),
                body,
            });
        }
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn stored_token(&self, resp: TokenResponse, previous_refresh: Option<&str>) -> StoredToken {
        StoredToken {
            access_token: resp.access_token,
            refresh_token: resp
                .refresh_token
                .or_else(|| previous_refresh.map(str::to_string)),
            expires_at: resp.expires_in.map(|s| Utc::now() + Duration::seconds(s)),
            scope: resp.scope.unwrap_or_else(|| self.scope.clone()),
        }
    }
}

impl Authenticator for OAuthAuthenticator {
    fn get_session(&self) -> BoxFuture<'_, Result<Session, AuthError>> {
        Box::pin(self.session())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Starts a mock token endpoint that answers exactly one request.
    async fn mock_token_server(status: u16, body: &str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}/token");
        let body = body.to_string();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_request(&mut stream).await;

            let resp = format!(
                "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(resp.as_bytes()).await;
            let _ = stream.shutdown().await;
            request
        });

        (url, handle)
    }

    /// Reads headers plus a `Content-Length` body.
    async fn read_request(stream: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let len = text[..end]
                    .lines()
                    .find_map(|l| {
                        let (k, v) = l.split_once(':')?;
                        k.eq_ignore_ascii_case("content-length")
                            .then(|| v.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= end + 4 + len {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn secret(token_uri: &str) -> ClientSecret {
        ClientSecret {
            client_id: "cid".into(),
            client_secret: "csecret".into(),
            auth_uri: DEFAULT_AUTH_URI.into(),
            token_uri: token_uri.into(),
        }
    }

    fn expired_store(dir: &Path) -> Arc<TokenStore> {
        let store = TokenStore::new(dir.join("token.json")).unwrap();
        store
            .save(StoredToken {
                access_token: "old".into(),
                refresh_token: Some("r1".into()),
                expires_at: Some(Utc::now() - Duration::seconds(10)),
                scope: YOUTUBE_SCOPE.into(),
            })
            .unwrap();
        Arc::new(store)
    }

    #[test]
    fn client_secret_installed_section() {
        let json = r#"{"installed":{"client_id":"id","client_secret":"sec","redirect_uris":["http://localhost"]}}"#;
        let secret = ClientSecret::from_json(json).unwrap();
        assert_eq!(secret.client_id, "id");
        assert_eq!(secret.token_uri, DEFAULT_TOKEN_URI);
    }

    #[test]
    fn client_secret_missing_section() {
        let err = ClientSecret::from_json(r#"{"other":{}}"#).unwrap_err();
        assert!(matches!(err, AuthError::ClientSecret(_)));
    }

    #[test]
    fn consent_url_contains_pkce_and_scope() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(TokenStore::new(tmp.path().join("t.json")).unwrap());
        let auth = OAuthAuthenticator::new(secret(DEFAULT_TOKEN_URI), store).unwrap();
        let url = auth.consent_url("http://127.0.0.1:9", "st", "ch");
        assert!(url.starts_with(DEFAULT_AUTH_URI));
        assert!(url.contains("code_challenge=ch"));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("state=st"));
        assert!(url.contains("scope=https%3A%2F%2Fwww%2Egoogleapis%2Ecom%2Fauth%2Fyoutube"));
    }

    #[tokio::test]
    async fn valid_stored_token_needs_no_network() {
        let tmp = tempfile::tempdir().unwrap();
        let store = TokenStore::new(tmp.path().join("token.json")).unwrap();
        store
            .save(StoredToken {
                access_token: "fresh".into(),
                refresh_token: None,
                expires_at: Some(Utc::now() + Duration::hours(1)),
                scope: String::new(),
            })
            .unwrap();

        // Token URI points nowhere; any request would fail.
        let auth =
            OAuthAuthenticator::new(secret("http://127.0.0.1:1/token"), Arc::new(store)).unwrap();
        let session = auth.get_session().await.unwrap();
        assert_eq!(session.access_token, "fresh");
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_and_persisted() {
        let tmp = tempfile::tempdir().unwrap();
        let store = expired_store(tmp.path());
        let (url, server) =
            mock_token_server(200, r#"{"access_token":"new","expires_in":3600,"token_type":"Bearer"}"#)
                .await;

        let auth = OAuthAuthenticator::new(secret(&url), Arc::clone(&store)).unwrap();
        let session = auth.get_session().await.unwrap();
        assert_eq!(session.access_token, "new");

        let request = server.await.unwrap();
        assert!(request.contains("grant_type=refresh_token"));
        assert!(request.contains("refresh_token=r1"));

        let stored = store.get().unwrap();
        assert_eq!(stored.access_token, "new");
        // Refresh responses usually omit the refresh token; keep the old one.
        assert_eq!(stored.refresh_token.as_deref(), Some("r1"));

        let reloaded = TokenStore::new(tmp.path().join("token.json")).unwrap();
        assert_eq!(reloaded.get().unwrap().access_token, "new");
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let tmp = tempfile::tempdir().unwrap();
        let store = expired_store(tmp.path());
        // The mock server answers a single request; a second refresh would fail.
        let (url, _server) =
            mock_token_server(200, r#"{"access_token":"shared","expires_in":3600}"#).await;

        let auth = Arc::new(OAuthAuthenticator::new(secret(&url), store).unwrap());
        let tasks: Vec<_> = (0..6)
            .map(|_| {
                let a = Arc::clone(&auth);
                tokio::spawn(async move { a.get_session().await })
            })
            .collect();

        for t in tasks {
            let session = t.await.unwrap().unwrap();
            assert_eq!(session.access_token, "shared");
        }
    }

    #[tokio::test]
    async fn refresh_rejection_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let store = expired_store(tmp.path());
        let (url, _server) = mock_token_server(400, r#"{"error":"invalid_grant"}"#).await;

        let auth = OAuthAuthenticator::new(secret(&url), store).unwrap();
        let err = auth.get_session().await.unwrap_err();
        match err {
            AuthError::TokenEndpoint { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("invalid_grant"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
