//! YouTube Data API v3 client.
//!
//! Async HTTP client using `reqwest` with per-request Bearer tokens taken
//! from the caller's [`Session`].

use autotube_auth::{BoxFuture, Session};
use reqwest::header::{CONTENT_RANGE, CONTENT_TYPE, LOCATION, RANGE};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, trace};

use crate::types::{
    ChunkOutcome, Collection, CollectionPage, NewCollection, UploadHandle, VideoMetadata,
};
use crate::{HostError, MediaHost};

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";

/// Status YouTube uses for "Resume Incomplete".
const RESUME_INCOMPLETE: u16 = 308;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistListResponse {
    #[serde(default)]
    items: Vec<PlaylistResource>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct PlaylistResource {
    id: String,
    snippet: PlaylistSnippet,
}

#[derive(Deserialize)]
struct PlaylistSnippet {
    title: String,
}

#[derive(Deserialize)]
struct IdResource {
    id: String,
}

/// YouTube API client.
pub struct YouTubeClient {
    http: reqwest::Client,
    base_url: String,
}

impl YouTubeClient {
    pub fn new() -> Result<Self, HostError> {
        // 308 means "Resume Incomplete" here, not a redirect.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Sets a custom base URL (for testing).
    #[cfg(test)]
    pub(crate) fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    async fn open_upload(
        &self,
        session: &Session,
        metadata: &VideoMetadata,
        size: u64,
    ) -> Result<UploadHandle, HostError> {
        let url = format!("{}/upload/youtube/v3/videos", self.base_url);
        let body = json!({
            "snippet": {
                "title": metadata.title,
                "description": metadata.description,
                "tags": metadata.tags,
                "categoryId": metadata.category_id,
            },
            "status": {
                "privacyStatus": metadata.privacy.as_str(),
            },
        });

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&session.access_token)
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .header("X-Upload-Content-Length", size.to_string())
            .header("X-Upload-Content-Type", "video/*")
            .json(&body)
            .send()
            .await?;
        let resp = check(resp).await?;

        let location = resp
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| HostError::Protocol("upload session has no Location header".into()))?;

        debug!(title = %metadata.title, size, "opened resumable upload");
        Ok(UploadHandle(location.to_string()))
    }

    async fn put_chunk(
        &self,
        session: &Session,
        handle: &UploadHandle,
        offset: u64,
        data: Vec<u8>,
        total: u64,
    ) -> Result<ChunkOutcome, HostError> {
        let len = data.len() as u64;
        let range = content_range(offset, len, total);
        trace!(%range, "sending chunk");

        let resp = self
            .http
            .put(handle.as_str())
            .bearer_auth(&session.access_token)
            .header(CONTENT_RANGE, range)
            .header(CONTENT_TYPE, "video/*")
            .body(data)
            .send()
            .await?;

        if resp.status().as_u16() == RESUME_INCOMPLETE {
            let committed = match resp.headers().get(RANGE) {
                Some(value) => parse_committed(value.to_str().unwrap_or_default())?,
                None => 0,
            };
            return Ok(ChunkOutcome::Progress { committed });
        }

        let resp = check(resp).await?;
        let bytes = resp.bytes().await?;
        let video: IdResource = serde_json::from_slice(&bytes)?;
        Ok(ChunkOutcome::Complete {
            remote_id: video.id,
        })
    }

    async fn playlists_page(
        &self,
        session: &Session,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<CollectionPage, HostError> {
        let url = format!("{}/youtube/v3/playlists", self.base_url);
        let mut params = vec![
            ("part", "snippet".to_string()),
            ("mine", "true".to_string()),
            ("maxResults", page_size.to_string()),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }

        let resp = self
            .http
            .get(&url)
            .bearer_auth(&session.access_token)
            .query(&params)
            .send()
            .await?;
        let resp = check(resp).await?;
        let bytes = resp.bytes().await?;
        let list: PlaylistListResponse = serde_json::from_slice(&bytes)?;

        Ok(CollectionPage {
            items: list
                .items
                .into_iter()
                .map(|p| Collection {
                    id: p.id,
                    title: p.snippet.title,
                })
                .collect(),
            next_page_token: list.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    async fn insert_playlist(
        &self,
        session: &Session,
        collection: &NewCollection,
    ) -> Result<String, HostError> {
        let url = format!("{}/youtube/v3/playlists", self.base_url);
        let body = json!({
            "snippet": {
                "title": collection.title,
                "description": collection.description,
            },
            "status": {
                "privacyStatus": collection.privacy.as_str(),
            },
        });

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&session.access_token)
            .query(&[("part", "snippet,status")])
            .json(&body)
            .send()
            .await?;
        let resp = check(resp).await?;
        let bytes = resp.bytes().await?;
        let created: IdResource = serde_json::from_slice(&bytes)?;
        debug!(title = %collection.title, id = %created.id, "created playlist");
        Ok(created.id)
    }

    async fn insert_playlist_item(
        &self,
        session: &Session,
        collection_id: &str,
        remote_id: &str,
    ) -> Result<(), HostError> {
        let url = format!("{}/youtube/v3/playlistItems", self.base_url);
        let body = json!({
            "snippet": {
                "playlistId": collection_id,
                "resourceId": {
                    "kind": "youtube#video",
                    "videoId": remote_id,
                },
            },
        });

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&session.access_token)
            .query(&[("part", "snippet")])
            .json(&body)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }
}

impl MediaHost for YouTubeClient {
    fn create_upload_session<'a>(
        &'a self,
        session: &'a Session,
        metadata: &'a VideoMetadata,
        size: u64,
    ) -> BoxFuture<'a, Result<UploadHandle, HostError>> {
        Box::pin(self.open_upload(session, metadata, size))
    }

    fn send_chunk<'a>(
        &'a self,
        session: &'a Session,
        handle: &'a UploadHandle,
        offset: u64,
        data: Vec<u8>,
        total: u64,
    ) -> BoxFuture<'a, Result<ChunkOutcome, HostError>> {
        Box::pin(self.put_chunk(session, handle, offset, data, total))
    }

    fn list_collections<'a>(
        &'a self,
        session: &'a Session,
        page_size: u32,
        page_token: Option<&'a str>,
    ) -> BoxFuture<'a, Result<CollectionPage, HostError>> {
        Box::pin(self.playlists_page(session, page_size, page_token))
    }

    fn create_collection<'a>(
        &'a self,
        session: &'a Session,
        collection: &'a NewCollection,
    ) -> BoxFuture<'a, Result<String, HostError>> {
        Box::pin(self.insert_playlist(session, collection))
    }

    fn add_membership<'a>(
        &'a self,
        session: &'a Session,
        collection_id: &'a str,
        remote_id: &'a str,
    ) -> BoxFuture<'a, Result<(), HostError>> {
        Box::pin(self.insert_playlist_item(session, collection_id, remote_id))
    }
}

/// Maps non-success responses to [`HostError`].
async fn check(resp: Response) -> Result<Response, HostError> {
    let status = resp.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(HostError::Unauthorized);
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(HostError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(resp)
}

/// Builds the `Content-Range` value for a chunk.
fn content_range(offset: u64, len: u64, total: u64) -> String {
    if len == 0 {
        format!("bytes */{total}")
    } else {
        format!("bytes {}-{}/{}", offset, offset + len - 1, total)
    }
}

/// Parses a `Range: bytes=0-N` header into the committed byte count.
fn parse_committed(value: &str) -> Result<u64, HostError> {
    let last = value
        .trim()
        .strip_prefix("bytes=")
        .and_then(|r| r.split_once('-'))
        .and_then(|(_, end)| end.parse::<u64>().ok())
        .ok_or_else(|| HostError::Protocol(format!("malformed Range header: {value}")))?;
    Ok(last + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use autotube_auth::Session;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use crate::types::Privacy;

    /// Canned HTTP response for the mock server.
    struct Canned {
        status: &'static str,
        headers: Vec<(&'static str, String)>,
        body: String,
    }

    fn canned(status: &'static str, body: &str) -> Canned {
        Canned {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 8192];
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

    /// Starts a mock HTTP server answering one request per canned response,
    /// in order, and recording the raw requests.
    async fn mock_server(responses: Vec<Canned>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);

        tokio::spawn(async move {
            for canned in responses {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let request = read_request(&mut stream).await;
                seen.lock().unwrap().push(request);

                let mut resp = format!("HTTP/1.1 {}\r\n", canned.status);
                for (k, v) in &canned.headers {
                    resp.push_str(&format!("{k}: {v}\r\n"));
                }
                resp.push_str(&format!(
                    "Content-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    canned.body.len(),
                    canned.body
                ));
                let _ = stream.write_all(resp.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        (url, requests)
    }

    fn session() -> Session {
        Session::new("tok-123", None)
    }

    fn metadata() -> VideoMetadata {
        VideoMetadata {
            title: "clip1.mp4".into(),
            description: "Uploaded via YouTube API".into(),
            tags: vec!["gaming".into(), "PC".into()],
            category_id: "20".into(),
            privacy: Privacy::Unlisted,
        }
    }

    fn client(url: String) -> YouTubeClient {
        YouTubeClient::new().unwrap().with_base_url(url)
    }

    #[test]
    fn content_range_formats() {
        assert_eq!(content_range(0, 10, 100), "bytes 0-9/100");
        assert_eq!(content_range(90, 10, 100), "bytes 90-99/100");
        assert_eq!(content_range(0, 0, 0), "bytes */0");
    }

    #[test]
    fn parse_committed_range() {
        assert_eq!(parse_committed("bytes=0-8388607").unwrap(), 8_388_608);
        assert!(matches!(parse_committed("garbage"), Err(HostError::Protocol(_))));
    }

    #[tokio::test]
    async fn open_upload_returns_location() {
        let (url, requests) = mock_server(vec![Canned {
            status: "200 OK",
            headers: vec![("Location", "http://upload.example/session-1".into())],
            body: String::new(),
        }])
        .await;

        let handle = client(url)
            .create_upload_session(&session(), &metadata(), 1234)
            .await
            .unwrap();
        assert_eq!(handle.as_str(), "http://upload.example/session-1");

        let req = requests.lock().unwrap()[0].clone();
        assert!(req.starts_with("POST /upload/youtube/v3/videos?uploadType=resumable"));
        assert!(req.to_lowercase().contains("x-upload-content-length: 1234"));
        assert!(req.contains("Bearer tok-123"));
        assert!(req.contains("\"categoryId\":\"20\""));
        assert!(req.contains("\"privacyStatus\":\"unlisted\""));
    }

    #[tokio::test]
    async fn open_upload_without_location_is_protocol_error() {
        let (url, _) = mock_server(vec![canned("200 OK", "")]).await;
        let err = client(url)
            .create_upload_session(&session(), &metadata(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::Protocol(_)));
    }

    #[tokio::test]
    async fn chunk_resume_incomplete_reports_committed() {
        let (url, requests) = mock_server(vec![
            Canned {
                status: "308 Resume Incomplete",
                headers: vec![("Range", "bytes=0-3".into())],
                body: String::new(),
            },
            canned("308 Resume Incomplete", ""),
        ])
        .await;

        let yt = client(url.clone());
        let handle = UploadHandle(format!("{url}/upload-session"));

        let outcome = yt
            .send_chunk(&session(), &handle, 0, b"abcd".to_vec(), 10)
            .await
            .unwrap();
        assert_eq!(outcome, ChunkOutcome::Progress { committed: 4 });

        // No Range header: nothing committed yet.
        let outcome = yt
            .send_chunk(&session(), &handle, 0, b"abcd".to_vec(), 10)
            .await
            .unwrap();
        assert_eq!(outcome, ChunkOutcome::Progress { committed: 0 });

        let req = requests.lock().unwrap()[0].clone();
        assert!(req.starts_with("PUT /upload-session"));
        assert!(req.to_lowercase().contains("content-range: bytes 0-3/10"));
        assert!(req.ends_with("abcd"));
    }

    #[tokio::test]
    async fn chunk_complete_returns_video_id() {
        let (url, _) = mock_server(vec![canned("201 Created", r#"{"id":"vid-42","kind":"youtube#video"}"#)]).await;
        let handle = UploadHandle(format!("{url}/s"));
        let outcome = client(url)
            .send_chunk(&session(), &handle, 6, b"ghij".to_vec(), 10)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ChunkOutcome::Complete {
                remote_id: "vid-42".into()
            }
        );
    }

    #[tokio::test]
    async fn list_playlists_page() {
        let json = r#"{"items":[
            {"id":"PL1","snippet":{"title":"Chess"}},
            {"id":"PL2","snippet":{"title":"CounterStrike"}}
        ],"nextPageToken":"CAIQAA"}"#;
        let (url, requests) = mock_server(vec![canned("200 OK", json)]).await;

        let page = client(url)
            .list_collections(&session(), 50, Some("tok0"))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].title, "Chess");
        assert_eq!(page.next_page_token.as_deref(), Some("CAIQAA"));

        let req = requests.lock().unwrap()[0].clone();
        assert!(req.contains("mine=true"));
        assert!(req.contains("maxResults=50"));
        assert!(req.contains("pageToken=tok0"));
    }

    #[tokio::test]
    async fn empty_playlist_list_has_no_items() {
        let (url, _) = mock_server(vec![canned("200 OK", r#"{"kind":"youtube#playlistListResponse"}"#)]).await;

        let page = client(url)
            .list_collections(&session(), 50, None)
            .await
            .unwrap();
        assert!(page.items.is_empty());
        assert!(page.next_page_token.is_none());
    }

    #[tokio::test]
    async fn create_playlist_and_item() {
        let (url, requests) = mock_server(vec![
            canned("200 OK", r#"{"id":"PLnew"}"#),
            canned("200 OK", r#"{"id":"item-1"}"#),
        ])
        .await;
        let yt = client(url);

        let id = yt
            .create_collection(
                &session(),
                &NewCollection {
                    title: "Chess".into(),
                    description: "Auto-created playlist for Chess".into(),
                    privacy: Privacy::Private,
                },
            )
            .await
            .unwrap();
        assert_eq!(id, "PLnew");

        yt.add_membership(&session(), "PLnew", "vid-1").await.unwrap();

        let reqs = requests.lock().unwrap();
        assert!(reqs[0].contains("\"privacyStatus\":\"private\""));
        assert!(reqs[1].starts_with("POST /youtube/v3/playlistItems"));
        assert!(reqs[1].contains("\"videoId\":\"vid-1\""));
        assert!(reqs[1].contains("\"playlistId\":\"PLnew\""));
    }

    #[tokio::test]
    async fn unauthorized_is_mapped() {
        let (url, _) = mock_server(vec![canned("401 Unauthorized", "{}")]).await;
        let err = client(url)
            .list_collections(&session(), 50, None)
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::Unauthorized));
    }

    #[tokio::test]
    async fn api_error_carries_body() {
        let (url, _) = mock_server(vec![canned("403 Forbidden", r#"{"error":"quotaExceeded"}"#)]).await;
        let err = client(url)
            .add_membership(&session(), "PL", "v")
            .await
            .unwrap_err();
        match err {
            HostError::Api { status, body } => {
                assert_eq!(status, 403);
                assert!(body.contains("quotaExceeded"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
