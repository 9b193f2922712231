//! Loopback redirect receiver for the installed-app consent flow.

use percent_encoding::percent_decode_str;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

use crate::AuthError;

const MAX_REQUEST_BYTES: usize = 16 * 1024;

const DONE_PAGE: &str = "<html><body>Authorization complete. You may close this window.</body></html>";
const FAILED_PAGE: &str = "<html><body>Authorization failed. Check the terminal.</body></html>";

/// Waits for the browser to hit the redirect URI and returns the code.
///
/// Requests without `code` or `error` (favicon probes and the like) get a
/// 404 and are otherwise ignored.
pub(crate) async fn wait_for_code(
    listener: &TcpListener,
    expected_state: &str,
) -> Result<String, AuthError> {
    loop {
        let (mut stream, peer) = listener.accept().await?;
        let target = match read_request_target(&mut stream).await {
            Ok(target) => target,
            Err(e) => {
                debug!(%peer, error = %e, "ignoring malformed redirect request");
                continue;
            }
        };

        let params = query_params(&target);
        let get = |key: &str| {
            params
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };

        if let Some(error) = get("error") {
            respond(&mut stream, "400 Bad Request", FAILED_PAGE).await;
            return Err(AuthError::Consent(error.to_string()));
        }

        let Some(code) = get("code") else {
            respond(&mut stream, "404 Not Found", "").await;
            continue;
        };

        if get("state") != Some(expected_state) {
            respond(&mut stream, "400 Bad Request", FAILED_PAGE).await;
            return Err(AuthError::Consent("state mismatch".into()));
        }

        let code = code.to_string();
        respond(&mut stream, "200 OK", DONE_PAGE).await;
        return Ok(code);
    }
}

async fn read_request_target(stream: &mut TcpStream) -> Result<String, AuthError> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.len() > MAX_REQUEST_BYTES {
            return Err(AuthError::Consent("redirect request too large".into()));
        }
    }

    let text = String::from_utf8_lossy(&buf);
    let request_line = text.lines().next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("GET"), Some(target)) => Ok(target.to_string()),
        _ => Err(AuthError::Consent(format!(
            "unexpected request line: {request_line}"
        ))),
    }
}

fn query_params(target: &str) -> Vec<(String, String)> {
    let Some((_, query)) = target.split_once('?') else {
        return Vec::new();
    };
    query
        .split('&')
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            let decode = |s: &str| {
                percent_decode_str(&s.replace('+', " "))
                    .decode_utf8_lossy()
                    .into_owned()
            };
            (!k.is_empty()).then(|| (decode(k), decode(v)))
        })
        .collect()
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let resp = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(resp.as_bytes()).await;
    let _ = stream.shutdown().await;
}
