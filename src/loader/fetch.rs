use std::{
    fmt,
    future::Future,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use ahash::AHashMap;
use bytes::Bytes;
#[cfg(feature = "download")]
use reqwest::{Client, header::CONTENT_ENCODING, redirect::Policy};
use tracing::debug;

use crate::common::lock;

const NOT_FOUND: u16 = 404;

/// A fetched response body plus the metadata the loaders care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub bytes: Bytes,
    /// Lowercased `Content-Encoding` header, if any.
    pub content_encoding: Option<String>,
}

impl Payload {
    pub fn new(bytes: impl Into<Bytes>) -> Self { Self { bytes: bytes.into(), content_encoding: None } }

    pub fn with_encoding(mut self, encoding: &str) -> Self {
        self.content_encoding = Some(encoding.to_ascii_lowercase());
        self
    }
}

/// Why a fetch failed. All variants are transient from the caller's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The server answered with a non-2xx status.
    Status(u16),
    /// The request did not complete within the configured timeout.
    Timeout,
    /// Connection, TLS or body-transfer failure.
    Network(String),
    /// Local read failure (disk fetcher).
    Io(String),
}

impl FetchError {
    #[inline] pub fn is_not_found(&self) -> bool { matches!(self, Self::Status(NOT_FOUND | 410)) }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(code) => write!(f, "HTTP status {code}"),
            Self::Timeout => write!(f, "request timed out"),
            Self::Network(msg) => write!(f, "network error: {msg}"),
            Self::Io(msg) => write!(f, "read error: {msg}"),
        }
    }
}

impl std::error::Error for FetchError {}

#[cfg(feature = "download")]
impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if let Some(status) = err.status() {
            Self::Status(status.as_u16())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Read-only access to remote payloads by URL.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Payload, FetchError>> + Send;
}

/// HTTP(S) fetcher with a per-request timeout.
#[cfg(feature = "download")]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

#[cfg(feature = "download")]
impl HttpFetcher {
    pub fn new(timeout: std::time::Duration, user_agent: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .redirect(Policy::limited(10))
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[cfg(feature = "download")]
impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Payload, FetchError>> + Send {
        let client = self.client.clone();
        let url = url.to_string();
        async move {
            debug!("GET {url}");
            let resp = client.get(&url).send().await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(FetchError::Status(status.as_u16()));
            }
            let content_encoding = resp.headers()
                .get(CONTENT_ENCODING)
                .and_then(|v| v.to_str().ok())
                .map(str::to_ascii_lowercase);
            let bytes = resp.bytes().await?;
            Ok(Payload { bytes, content_encoding })
        }
    }
}

/// Serves URLs from a local directory tree.
///
/// `file://` URLs and bare relative paths map directly under the root; for `http(s)://`
/// URLs the host is dropped and the path is resolved under the root. Reads go through
/// `tokio::fs`, so the returned futures need a Tokio runtime.
#[derive(Debug, Clone)]
pub struct DiskFetcher {
    root: PathBuf,
}

impl DiskFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

    fn full(&self, url: &str) -> PathBuf {
        let path = url.split(['?', '#']).next().unwrap_or_default();
        let rel = if let Some(rest) = path.strip_prefix("file://") {
            rest
        } else if let Some((_, rest)) = path.split_once("://") {
            rest.split_once('/').map_or("", |(_, p)| p)
        } else {
            path
        };
        self.root.join(rel.trim_start_matches('/'))
    }
}

impl Fetcher for DiskFetcher {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Payload, FetchError>> + Send {
        let path = self.full(url);
        async move {
            debug!("READ {}", path.display());
            match tokio::fs::read(&path).await {
                Ok(bytes) => Ok(Payload::new(bytes)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Err(FetchError::Status(NOT_FOUND))
                }
                Err(e) => Err(FetchError::Io(format!("{}: {e}", path.display()))),
            }
        }
    }
}

/// Simple in-memory fetcher. Unknown URLs answer 404. Counts requests per URL.
#[derive(Debug, Default, Clone)]
pub struct MemFetcher {
    responses: AHashMap<String, Result<Payload, FetchError>>,
    requests: Arc<Mutex<AHashMap<String, usize>>>,
}

impl MemFetcher {
    pub fn new() -> Self { Self::default() }

    /// Serve `bytes` at `url`.
    pub fn with(mut self, url: &str, bytes: impl Into<Bytes>) -> Self {
        self.responses.insert(url.to_string(), Ok(Payload::new(bytes)));
        self
    }

    /// Serve a full payload (e.g. with a content encoding) at `url`.
    pub fn with_payload(mut self, url: &str, payload: Payload) -> Self {
        self.responses.insert(url.to_string(), Ok(payload));
        self
    }

    /// Fail requests to `url` with `error`.
    pub fn with_error(mut self, url: &str, error: FetchError) -> Self {
        self.responses.insert(url.to_string(), Err(error));
        self
    }

    /// Number of requests made for `url` so far.
    pub fn requests(&self, url: &str) -> usize { lock(&self.requests).get(url).copied().unwrap_or(0) }

    /// Number of requests made for any URL so far.
    pub fn total_requests(&self) -> usize { lock(&self.requests).values().sum() }
}

impl Fetcher for MemFetcher {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Payload, FetchError>> + Send {
        *lock(&self.requests).entry(url.to_string()).or_default() += 1;
        let result = self.responses.get(url).cloned()
            .unwrap_or(Err(FetchError::Status(NOT_FOUND)));
        async move { result }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mem_fetcher_serves_and_counts() {
        let fetcher = MemFetcher::new().with("a", "hello").with_error("b", FetchError::Timeout);
        assert_eq!(fetcher.fetch("a").await.unwrap().bytes, Bytes::from("hello"));
        assert_eq!(fetcher.fetch("b").await, Err(FetchError::Timeout));
        assert!(fetcher.fetch("c").await.unwrap_err().is_not_found());
        assert_eq!(fetcher.requests("a"), 1);
        assert_eq!(fetcher.total_requests(), 3);
    }

    #[test]
    fn disk_fetcher_maps_urls_under_root() {
        let disk = DiskFetcher::new("/data");
        assert_eq!(disk.full("https://host.org/a/b.csv?x=1"), PathBuf::from("/data/a/b.csv"));
        assert_eq!(disk.full("file:///a/b.csv"), PathBuf::from("/data/a/b.csv"));
        assert_eq!(disk.full("a/b.csv"), PathBuf::from("/data/a/b.csv"));
    }

    #[tokio::test]
    async fn disk_fetcher_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("x.json"), b"[]").unwrap();
        let disk = DiskFetcher::new(dir.path());
        assert_eq!(disk.fetch("x.json").await.unwrap().bytes, Bytes::from("[]"));
        assert_eq!(disk.fetch("missing.json").await, Err(FetchError::Status(404)));
    }
}
