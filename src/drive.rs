use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};

use crate::error::CorrError;

pub const DEFAULT_ENDPOINT: &str = "https://docs.google.com/uc";

/// Bytes written per read of the response body.
pub const CHUNK_SIZE: usize = 32 * 1024;

const CONFIRM_COOKIE_PREFIX: &str = "download_warning";
const MAX_INTERSTITIAL_BYTES: u64 = 1024 * 1024;

pub struct DriveResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub cookies: Vec<(String, String)>,
    pub body: Box<dyn Read + Send>,
}

impl DriveResponse {
    fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|value| value.contains("text/html"))
            .unwrap_or(false)
    }
}

/// One download attempt. Cookies set by earlier requests are sent with later ones.
pub trait DriveSession {
    fn get(&mut self, query: &[(&str, &str)]) -> Result<DriveResponse, CorrError>;
}

pub trait DriveTransport: Send + Sync {
    fn open_session(&self) -> Result<Box<dyn DriveSession + '_>, CorrError>;
}

#[derive(Debug, Clone, Copy)]
pub struct DownloadInfo {
    pub bytes: u64,
    pub confirmed: bool,
}

#[derive(Clone)]
pub struct DriveHttpClient {
    endpoint: String,
    headers: HeaderMap,
}

impl DriveHttpClient {
    pub fn new() -> Result<Self, CorrError> {
        Self::with_endpoint(DEFAULT_ENDPOINT)
    }

    pub fn with_endpoint(endpoint: &str) -> Result<Self, CorrError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("corrbench/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| CorrError::Configuration(err.to_string()))?,
        );
        Ok(Self {
            endpoint: endpoint.to_string(),
            headers,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl DriveTransport for DriveHttpClient {
    fn open_session(&self) -> Result<Box<dyn DriveSession + '_>, CorrError> {
        let client = Client::builder()
            .default_headers(self.headers.clone())
            .cookie_store(true)
            .connect_timeout(Duration::from_secs(30))
            .timeout(None::<Duration>)
            .build()
            .map_err(|err| CorrError::Network(err.to_string()))?;
        Ok(Box::new(HttpSession {
            client,
            endpoint: &self.endpoint,
        }))
    }
}

struct HttpSession<'a> {
    client: Client,
    endpoint: &'a str,
}

impl DriveSession for HttpSession<'_> {
    fn get(&mut self, query: &[(&str, &str)]) -> Result<DriveResponse, CorrError> {
        tracing::debug!(endpoint = self.endpoint, ?query, "drive request");
        let response = self
            .client
            .get(self.endpoint)
            .query(&[("export", "download")])
            .query(query)
            .send()
            .map_err(|err| CorrError::Network(err.to_string()))?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());
        let cookies = response
            .cookies()
            .map(|cookie| (cookie.name().to_string(), cookie.value().to_string()))
            .collect();
        tracing::debug!(status, ?content_type, "drive response");
        Ok(DriveResponse {
            status,
            content_type,
            cookies,
            body: Box::new(response),
        })
    }
}

/// Runs the confirm handshake for `remote_id` and streams the payload to
/// `destination`, truncating anything left there by an earlier attempt.
pub fn download_archive(
    session: &mut dyn DriveSession,
    remote_id: &str,
    destination: &Path,
) -> Result<DownloadInfo, CorrError> {
    let mut response = session.get(&[("id", remote_id), ("confirm", "t")])?;
    ensure_success(&mut response)?;

    let mut token = confirm_token(&response.cookies);
    let mut interstitial = None;
    if token.is_none() && response.is_html() {
        let page = read_interstitial(&mut response)?;
        token = confirm_token_from_html(&page);
        interstitial = Some(page);
    }

    let confirmed = token.is_some();
    if let Some(token) = token {
        tracing::info!(remote_id, "confirmation token received; re-requesting");
        response = session.get(&[("id", remote_id), ("confirm", token.as_str())])?;
        ensure_success(&mut response)?;
    } else if let Some(page) = interstitial {
        // Keep the page on disk so extraction reports it as a corrupt archive.
        let mut file =
            File::create(destination).map_err(|err| CorrError::Filesystem(err.to_string()))?;
        file.write_all(page.as_bytes())
            .map_err(|err| CorrError::Filesystem(err.to_string()))?;
        return Ok(DownloadInfo {
            bytes: page.len() as u64,
            confirmed,
        });
    }

    let bytes = save_response_content(&mut response.body, destination)?;
    Ok(DownloadInfo { bytes, confirmed })
}

pub fn confirm_token(cookies: &[(String, String)]) -> Option<String> {
    cookies
        .iter()
        .find(|(name, _)| name.starts_with(CONFIRM_COOKIE_PREFIX))
        .map(|(_, value)| value.clone())
}

/// Newer share pages carry the token in the download form instead of a cookie.
pub fn confirm_token_from_html(page: &str) -> Option<String> {
    static CONFIRM_RE: OnceLock<Regex> = OnceLock::new();
    let re = CONFIRM_RE.get_or_init(|| {
        Regex::new(r#"confirm=([0-9A-Za-z_\-]+)|name="confirm"\s+value="([0-9A-Za-z_\-]+)""#)
            .expect("valid confirm regex")
    });
    re.captures_iter(page)
        .filter_map(|captures| captures.get(1).or_else(|| captures.get(2)))
        .map(|value| value.as_str())
        .find(|value| *value != "t")
        .map(str::to_string)
}

pub fn save_response_content(body: &mut dyn Read, destination: &Path) -> Result<u64, CorrError> {
    let mut file =
        File::create(destination).map_err(|err| CorrError::Filesystem(err.to_string()))?;
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut written = 0u64;
    loop {
        let read = match body.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(CorrError::Network(err.to_string())),
        };
        file.write_all(&buffer[..read])
            .map_err(|err| CorrError::Filesystem(err.to_string()))?;
        written += read as u64;
    }
    file.flush()
        .map_err(|err| CorrError::Filesystem(err.to_string()))?;
    Ok(written)
}

fn ensure_success(response: &mut DriveResponse) -> Result<(), CorrError> {
    if (200..300).contains(&response.status) {
        return Ok(());
    }
    let mut message = String::new();
    // Best effort: the status alone is reported when the body is unreadable.
    let _ = (&mut response.body)
        .take(512)
        .read_to_string(&mut message);
    if message.trim().is_empty() {
        message = "drive request failed".to_string();
    }
    Err(CorrError::NetworkStatus {
        status: response.status,
        message: message.trim().to_string(),
    })
}

fn read_interstitial(response: &mut DriveResponse) -> Result<String, CorrError> {
    let mut bytes = Vec::new();
    (&mut response.body)
        .take(MAX_INTERSTITIAL_BYTES)
        .read_to_end(&mut bytes)
        .map_err(|err| CorrError::Network(err.to_string()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io::Cursor;

    use assert_matches::assert_matches;

    use super::*;

    struct Reply {
        status: u16,
        content_type: Option<&'static str>,
        cookies: Vec<(&'static str, &'static str)>,
        body: Vec<u8>,
    }

    impl Reply {
        fn ok(body: &[u8]) -> Self {
            Self {
                status: 200,
                content_type: Some("application/octet-stream"),
                cookies: Vec::new(),
                body: body.to_vec(),
            }
        }
    }

    #[derive(Default)]
    struct ScriptedSession {
        replies: VecDeque<Reply>,
        requests: Vec<Vec<(String, String)>>,
    }

    impl DriveSession for ScriptedSession {
        fn get(&mut self, query: &[(&str, &str)]) -> Result<DriveResponse, CorrError> {
            self.requests.push(
                query
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            );
            let reply = self
                .replies
                .pop_front()
                .ok_or_else(|| CorrError::Network("no scripted reply".to_string()))?;
            Ok(DriveResponse {
                status: reply.status,
                content_type: reply.content_type.map(str::to_string),
                cookies: reply
                    .cookies
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                body: Box::new(Cursor::new(reply.body)),
            })
        }
    }

    #[test]
    fn confirm_token_uses_prefixed_cookie() {
        let cookies = vec![
            ("NID".to_string(), "abc".to_string()),
            ("download_warning_123".to_string(), "tok3n".to_string()),
        ];
        assert_eq!(confirm_token(&cookies).as_deref(), Some("tok3n"));
        assert_eq!(confirm_token(&cookies[..1]), None);
    }

    #[test]
    fn confirm_token_from_download_form() {
        let page = r#"<form action="https://drive.usercontent.google.com/download"><input type="hidden" name="confirm" value="Xy_9-z"></form>"#;
        assert_eq!(confirm_token_from_html(page).as_deref(), Some("Xy_9-z"));
        let link = r#"<a href="/uc?export=download&amp;confirm=AbC1&amp;id=x">"#;
        assert_eq!(confirm_token_from_html(link).as_deref(), Some("AbC1"));
        assert_eq!(confirm_token_from_html("<html>quota exceeded</html>"), None);
    }

    #[test]
    fn confirm_token_skips_placeholder_links() {
        let page = r#"<a href="/uc?export=download&amp;confirm=t&amp;id=x">retry</a>
            <a href="/uc?export=download&amp;confirm=Real_Tok&amp;id=x">Download anyway</a>"#;
        assert_eq!(confirm_token_from_html(page).as_deref(), Some("Real_Tok"));
        let only_placeholder = r#"<a href="/uc?confirm=t&amp;id=x">retry</a>"#;
        assert_eq!(confirm_token_from_html(only_placeholder), None);
    }

    #[test]
    fn download_without_token_issues_single_request() {
        let temp = tempfile::tempdir().unwrap();
        let dest = temp.path().join("a.tar.gz");
        let mut session = ScriptedSession::default();
        session.replies.push_back(Reply::ok(b"payload"));

        let info = download_archive(&mut session, "remote", &dest).unwrap();

        assert_eq!(info.bytes, 7);
        assert!(!info.confirmed);
        assert_eq!(std::fs::read(&dest).unwrap(), b"payload");
        let requests = &session.requests;
        assert_eq!(requests.len(), 1);
        assert!(requests[0].contains(&("confirm".to_string(), "t".to_string())));
        assert!(requests[0].contains(&("id".to_string(), "remote".to_string())));
    }

    #[test]
    fn download_retries_with_cookie_token() {
        let temp = tempfile::tempdir().unwrap();
        let dest = temp.path().join("a.tar.gz");
        let mut session = ScriptedSession::default();
        session.replies.push_back(Reply {
            status: 200,
            content_type: Some("text/html"),
            cookies: vec![("download_warning_123", "secret")],
            body: b"<html>warning</html>".to_vec(),
        });
        session.replies.push_back(Reply::ok(b"archive-bytes"));

        let info = download_archive(&mut session, "remote", &dest).unwrap();

        assert!(info.confirmed);
        assert_eq!(std::fs::read(&dest).unwrap(), b"archive-bytes");
        let requests = &session.requests;
        assert_eq!(requests.len(), 2);
        assert!(requests[1].contains(&("confirm".to_string(), "secret".to_string())));
    }

    #[test]
    fn html_page_without_token_is_kept_on_disk() {
        let temp = tempfile::tempdir().unwrap();
        let dest = temp.path().join("a.tar.gz");
        let mut session = ScriptedSession::default();
        session.replies.push_back(Reply {
            status: 200,
            content_type: Some("text/html; charset=utf-8"),
            cookies: Vec::new(),
            body: b"<html>quota exceeded</html>".to_vec(),
        });

        let info = download_archive(&mut session, "remote", &dest).unwrap();

        assert!(!info.confirmed);
        assert_eq!(
            std::fs::read_to_string(&dest).unwrap(),
            "<html>quota exceeded</html>"
        );
    }

    #[test]
    fn error_status_is_network_error() {
        let temp = tempfile::tempdir().unwrap();
        let dest = temp.path().join("a.tar.gz");
        let mut session = ScriptedSession::default();
        session.replies.push_back(Reply {
            status: 404,
            content_type: Some("text/plain"),
            cookies: Vec::new(),
            body: b"not found".to_vec(),
        });

        let err = download_archive(&mut session, "remote", &dest).unwrap_err();
        assert_matches!(err, CorrError::NetworkStatus { status: 404, .. });
        assert!(!dest.exists());
    }

    struct InterruptedOnce {
        interrupted: bool,
        inner: Cursor<Vec<u8>>,
    }

    impl Read for InterruptedOnce {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(io::Error::from(io::ErrorKind::Interrupted));
            }
            self.inner.read(buf)
        }
    }

    #[test]
    fn save_retries_interrupted_reads() {
        let temp = tempfile::tempdir().unwrap();
        let dest = temp.path().join("a.tar.gz");
        let mut body = InterruptedOnce {
            interrupted: false,
            inner: Cursor::new(b"payload".to_vec()),
        };

        let written = save_response_content(&mut body, &dest).unwrap();

        assert_eq!(written, 7);
        assert_eq!(std::fs::read(&dest).unwrap(), b"payload");
    }

    #[test]
    fn save_streams_large_bodies() {
        let temp = tempfile::tempdir().unwrap();
        let dest = temp.path().join("big.bin");
        let payload = vec![7u8; CHUNK_SIZE * 3 + 11];
        let mut body = Cursor::new(payload.clone());

        let written = save_response_content(&mut body, &dest).unwrap();

        assert_eq!(written, payload.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), payload);
    }
}
