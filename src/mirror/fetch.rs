// src/mirror/fetch.rs
// =============================================================================
// The conditional fetcher: decides whether a page has to be downloaded again.
//
// For each URL:
//
//   no local copy, or --force-download  ->  GET
//   local copy exists                   ->  HEAD, then compare:
//       HEAD redirected somewhere with no local copy  -> GET
//       no Last-Modified / unparsable Last-Modified   -> GET
//       Last-Modified newer than our file's mtime     -> GET
//       Content-Length != our file's size             -> GET
//       otherwise                                     -> read the local file
//
// Anything uncertain resolves toward downloading: we'd rather fetch a page
// twice than serve a stale copy.
//
// The caller gets back a FetchResult with a Body it can read chunk by chunk,
// wherever the bytes come from.
// =============================================================================

use crate::config::Config;
use crate::error::MirrorError;
use crate::mirror::paths::PathMapper;
use crate::stats::Recorder;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt};
use reqwest::header::{HeaderMap, CONTENT_LENGTH, CONTENT_TYPE, LAST_MODIFIED};
use reqwest::{Client, Response};
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};
use url::Url;

const READ_BUFFER_SIZE: usize = 16 * 1024;
const MAX_REDIRECTS: usize = 10;
const MAX_IDLE_PER_HOST: usize = 100;

/// How the content of a page was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchDecision {
    /// Straight GET: no local copy, or downloads are forced
    FetchFresh,
    /// HEAD said the local copy is stale, so we did a GET after it
    FetchConditional,
    /// HEAD said the local copy is current; no GET was issued
    ServeCached,
}

pub struct FetchResult {
    /// URL after redirects; replaces the requested URL from here on
    pub final_url: Url,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub last_modified: Option<String>,
    pub body: Body,
    /// Where this page lives on disk
    pub file_path: PathBuf,
    /// Whether the body must be written to file_path while it's read
    pub store: bool,
    pub decision: FetchDecision,
}

impl FetchResult {
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.trim_start().to_ascii_lowercase().starts_with("text/html"))
            .unwrap_or(false)
    }
}

// A page's bytes: either a network response or our existing file
pub enum Body {
    Remote(BoxStream<'static, reqwest::Result<Bytes>>),
    Local(File),
}

impl Body {
    // Next chunk of the page, or None at the end
    pub async fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        match self {
            Body::Remote(stream) => match stream.next().await {
                Some(Ok(chunk)) => Ok(Some(chunk)),
                Some(Err(e)) => Err(io::Error::new(io::ErrorKind::Other, e)),
                None => Ok(None),
            },
            Body::Local(file) => {
                let mut buf = vec![0u8; READ_BUFFER_SIZE];
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    return Ok(None);
                }
                buf.truncate(n);
                Ok(Some(Bytes::from(buf)))
            }
        }
    }
}

pub struct Fetcher {
    client: Client,
    mapper: PathMapper,
    force_download: bool,
}

impl Fetcher {
    pub fn new(config: &Config, mapper: PathMapper) -> Result<Self, MirrorError> {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
            .build()?;

        Ok(Fetcher {
            client,
            mapper,
            force_download: config.force_download,
        })
    }

    // Gets the content of `url`, from the network or from disk
    //
    // Parameters:
    //   url:   the page to fetch
    //   stats: this worker's counters (GET/HEAD are counted here)
    pub async fn fetch(&self, url: &Url, stats: &Recorder) -> Result<FetchResult, MirrorError> {
        let file_path = self.mapper.file_path(url)?;

        if self.force_download {
            return self.get(url, FetchDecision::FetchFresh, stats).await;
        }

        if local_metadata(&file_path).await?.is_none() {
            return self.get(url, FetchDecision::FetchFresh, stats).await;
        }

        info!(worker = stats.worker(), url = %url, "HEAD");
        stats.head().await;
        let head = self.client.head(url.clone()).send().await?;

        // A HEAD may redirect, and the new URL may map to another file
        let final_url = head.url().clone();
        let ok = head.status().is_success();
        let headers = head.headers().clone();
        drain(head).await;

        if !ok {
            return self.get(&final_url, FetchDecision::FetchConditional, stats).await;
        }

        let file_path = self.mapper.file_path(&final_url)?;
        let Some(meta) = local_metadata(&file_path).await? else {
            debug!(url = %final_url, "redirect target not on disk");
            return self.get(&final_url, FetchDecision::FetchConditional, stats).await;
        };

        if !is_fresh(&headers, &meta, &file_path)? {
            return self.get(&final_url, FetchDecision::FetchConditional, stats).await;
        }

        info!(worker = stats.worker(), url = %final_url, path = %file_path.display(), "unchanged, using local copy");
        let file = File::open(&file_path)
            .await
            .map_err(|source| MirrorError::Local {
                path: file_path.clone(),
                source,
            })?;

        Ok(FetchResult {
            final_url,
            content_type: header_str(&headers, CONTENT_TYPE).map(str::to_string),
            content_length: declared_length(&headers),
            last_modified: header_str(&headers, LAST_MODIFIED).map(str::to_string),
            body: Body::Local(file),
            file_path,
            store: false,
            decision: FetchDecision::ServeCached,
        })
    }

    // A full GET; the result is always marked for writing to disk
    async fn get(
        &self,
        url: &Url,
        decision: FetchDecision,
        stats: &Recorder,
    ) -> Result<FetchResult, MirrorError> {
        info!(worker = stats.worker(), url = %url, "GET");
        stats.get().await;
        let response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MirrorError::Status {
                url: response.url().to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().clone();
        let file_path = self.mapper.file_path(&final_url)?;
        let headers = response.headers();

        Ok(FetchResult {
            content_type: header_str(headers, CONTENT_TYPE).map(str::to_string),
            content_length: declared_length(headers),
            last_modified: header_str(headers, LAST_MODIFIED).map(str::to_string),
            final_url,
            file_path,
            store: true,
            decision,
            body: Body::Remote(response.bytes_stream().boxed()),
        })
    }
}

// Whether the server's metadata says our local copy is still current
fn is_fresh(headers: &HeaderMap, meta: &Metadata, file_path: &Path) -> Result<bool, MirrorError> {
    let Some(raw) = header_str(headers, LAST_MODIFIED) else {
        debug!(path = %file_path.display(), "no Last-Modified, assuming stale");
        return Ok(false);
    };

    let last_modified = match parse_http_date(raw) {
        Ok(t) => t,
        Err(e) => {
            debug!(value = raw, error = %e, "unparsable Last-Modified, assuming stale");
            return Ok(false);
        }
    };

    let mtime: DateTime<Utc> = meta
        .modified()
        .map_err(|source| MirrorError::Local {
            path: file_path.to_path_buf(),
            source,
        })?
        .into();

    if last_modified > mtime {
        return Ok(false);
    }

    Ok(declared_length(headers) == Some(meta.len()))
}

// Parses an RFC 1123 date ("Sun, 06 Nov 1994 08:49:37 GMT")
pub fn parse_http_date(raw: &str) -> chrono::ParseResult<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw.trim()).map(|t| t.with_timezone(&Utc))
}

fn header_str(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<&str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

// Content-Length as declared by the server
//
// Read from the header rather than Response::content_length(): for HEAD
// responses the latter reports the (empty) body, not the declared size.
fn declared_length(headers: &HeaderMap) -> Option<u64> {
    header_str(headers, CONTENT_LENGTH).and_then(|v| v.parse().ok())
}

// Metadata of an existing local copy; Ok(None) if there is none
async fn local_metadata(path: &Path) -> Result<Option<Metadata>, MirrorError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(Some(meta)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(MirrorError::Local {
            path: path.to_path_buf(),
            source,
        }),
    }
}

// Reads and discards whatever body a response has, so the connection can
// go back to the pool
async fn drain(response: Response) {
    if let Err(e) = response.bytes().await {
        debug!(error = %e, "failed to drain HEAD body");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::StatsCollector;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const OLD_DATE: &str = "Mon, 01 Jan 2001 00:00:00 GMT";
    const FUTURE_DATE: &str = "Fri, 01 Jan 2100 00:00:00 GMT";

    struct Setup {
        server: MockServer,
        dst: tempfile::TempDir,
        config: Config,
    }

    async fn setup() -> Setup {
        let server = MockServer::start().await;
        let dst = tempfile::tempdir().unwrap();
        let config = Config::new(&format!("{}/a/", server.uri()), dst.path()).unwrap();
        Setup { server, dst, config }
    }

    fn fetcher(config: &Config) -> Fetcher {
        let mapper = PathMapper::new(&config.src, &config.dst);
        Fetcher::new(config, mapper).unwrap()
    }

    fn url(setup: &Setup, p: &str) -> Url {
        Url::parse(&format!("{}{}", setup.server.uri(), p)).unwrap()
    }

    fn write_local(setup: &Setup, rel: &str, content: &[u8]) {
        let file = setup.dst.path().join(rel);
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(file, content).unwrap();
    }

    async fn read_all(body: &mut Body) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = body.next_chunk().await.unwrap() {
            out.extend_from_slice(&chunk);
        }
        out
    }

    fn head_response(last_modified: Option<&str>, length: usize) -> ResponseTemplate {
        // HEAD responses carry no body, but the declared length must match
        // what a GET would send
        let template = ResponseTemplate::new(200)
            .set_body_raw("x".repeat(length), "text/html")
            .insert_header("content-length", length.to_string().as_str());
        match last_modified {
            Some(date) => template.insert_header("last-modified", date),
            None => template,
        }
    }

    async fn mount_get(setup: &Setup, p: &str, body: &str, times: u64) {
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html"))
            .expect(times)
            .mount(&setup.server)
            .await;
    }

    #[tokio::test]
    async fn test_missing_local_file_gets() {
        let setup = setup().await;
        mount_get(&setup, "/a/page.html", "<p>hi</p>", 1).await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&setup.server)
            .await;

        let (stats, _collector) = StatsCollector::spawn(Duration::from_secs(60));
        let mut result = fetcher(&setup.config)
            .fetch(&url(&setup, "/a/page.html"), &stats.recorder(0))
            .await
            .unwrap();

        assert_eq!(result.decision, FetchDecision::FetchFresh);
        assert!(result.store);
        assert!(result.is_html());
        assert_eq!(result.file_path, setup.dst.path().join("page.html"));
        assert_eq!(read_all(&mut result.body).await, b"<p>hi</p>");
    }

    #[tokio::test]
    async fn test_unchanged_page_served_from_disk() {
        let setup = setup().await;
        write_local(&setup, "page.html", b"cached");
        Mock::given(method("HEAD"))
            .and(path("/a/page.html"))
            .respond_with(head_response(Some(OLD_DATE), 6))
            .expect(1)
            .mount(&setup.server)
            .await;
        mount_get(&setup, "/a/page.html", "fresh!", 0).await;

        let (stats, _collector) = StatsCollector::spawn(Duration::from_secs(60));
        let mut result = fetcher(&setup.config)
            .fetch(&url(&setup, "/a/page.html"), &stats.recorder(0))
            .await
            .unwrap();

        assert_eq!(result.decision, FetchDecision::ServeCached);
        assert!(!result.store);
        assert_eq!(result.content_length, Some(6));
        assert_eq!(read_all(&mut result.body).await, b"cached");
    }

    #[tokio::test]
    async fn test_missing_last_modified_gets() {
        let setup = setup().await;
        write_local(&setup, "page.html", b"cached");
        Mock::given(method("HEAD"))
            .and(path("/a/page.html"))
            .respond_with(head_response(None, 6))
            .mount(&setup.server)
            .await;
        mount_get(&setup, "/a/page.html", "fresh!", 1).await;

        let (stats, _collector) = StatsCollector::spawn(Duration::from_secs(60));
        let result = fetcher(&setup.config)
            .fetch(&url(&setup, "/a/page.html"), &stats.recorder(0))
            .await
            .unwrap();

        assert_eq!(result.decision, FetchDecision::FetchConditional);
        assert!(result.store);
    }

    #[tokio::test]
    async fn test_unparsable_last_modified_gets() {
        let setup = setup().await;
        write_local(&setup, "page.html", b"cached");
        Mock::given(method("HEAD"))
            .and(path("/a/page.html"))
            .respond_with(head_response(Some("yesterday-ish"), 6))
            .mount(&setup.server)
            .await;
        mount_get(&setup, "/a/page.html", "fresh!", 1).await;

        let (stats, _collector) = StatsCollector::spawn(Duration::from_secs(60));
        let result = fetcher(&setup.config)
            .fetch(&url(&setup, "/a/page.html"), &stats.recorder(0))
            .await
            .unwrap();

        assert_eq!(result.decision, FetchDecision::FetchConditional);
    }

    #[tokio::test]
    async fn test_newer_last_modified_gets() {
        let setup = setup().await;
        write_local(&setup, "page.html", b"cached");
        Mock::given(method("HEAD"))
            .and(path("/a/page.html"))
            .respond_with(head_response(Some(FUTURE_DATE), 6))
            .mount(&setup.server)
            .await;
        mount_get(&setup, "/a/page.html", "fresh!", 1).await;

        let (stats, _collector) = StatsCollector::spawn(Duration::from_secs(60));
        let result = fetcher(&setup.config)
            .fetch(&url(&setup, "/a/page.html"), &stats.recorder(0))
            .await
            .unwrap();

        assert_eq!(result.decision, FetchDecision::FetchConditional);
    }

    #[tokio::test]
    async fn test_size_mismatch_gets() {
        let setup = setup().await;
        write_local(&setup, "page.html", b"cached");
        Mock::given(method("HEAD"))
            .and(path("/a/page.html"))
            .respond_with(head_response(Some(OLD_DATE), 42))
            .mount(&setup.server)
            .await;
        mount_get(&setup, "/a/page.html", "fresh!", 1).await;

        let (stats, _collector) = StatsCollector::spawn(Duration::from_secs(60));
        let result = fetcher(&setup.config)
            .fetch(&url(&setup, "/a/page.html"), &stats.recorder(0))
            .await
            .unwrap();

        assert_eq!(result.decision, FetchDecision::FetchConditional);
    }

    #[tokio::test]
    async fn test_head_redirect_to_missing_file_gets_redirect_target() {
        let setup = setup().await;
        write_local(&setup, "old.html", b"cached");
        Mock::given(method("HEAD"))
            .and(path("/a/old.html"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", "/a/new.html"))
            .mount(&setup.server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/a/new.html"))
            .respond_with(head_response(Some(OLD_DATE), 6))
            .mount(&setup.server)
            .await;
        mount_get(&setup, "/a/old.html", "stale", 0).await;
        mount_get(&setup, "/a/new.html", "moved!", 1).await;

        let (stats, _collector) = StatsCollector::spawn(Duration::from_secs(60));
        let result = fetcher(&setup.config)
            .fetch(&url(&setup, "/a/old.html"), &stats.recorder(0))
            .await
            .unwrap();

        assert_eq!(result.decision, FetchDecision::FetchConditional);
        assert_eq!(result.final_url.path(), "/a/new.html");
        assert_eq!(result.file_path, setup.dst.path().join("new.html"));
    }

    #[tokio::test]
    async fn test_force_download_skips_head() {
        let mut setup = setup().await;
        setup.config.force_download = true;
        write_local(&setup, "page.html", b"cached");
        Mock::given(method("HEAD"))
            .respond_with(head_response(Some(OLD_DATE), 6))
            .expect(0)
            .mount(&setup.server)
            .await;
        mount_get(&setup, "/a/page.html", "fresh!", 1).await;

        let (stats, _collector) = StatsCollector::spawn(Duration::from_secs(60));
        let result = fetcher(&setup.config)
            .fetch(&url(&setup, "/a/page.html"), &stats.recorder(0))
            .await
            .unwrap();

        assert_eq!(result.decision, FetchDecision::FetchFresh);
    }

    #[tokio::test]
    async fn test_error_status_is_a_page_failure() {
        let setup = setup().await;
        Mock::given(method("GET"))
            .and(path("/a/gone.html"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&setup.server)
            .await;

        let (stats, _collector) = StatsCollector::spawn(Duration::from_secs(60));
        let err = fetcher(&setup.config)
            .fetch(&url(&setup, "/a/gone.html"), &stats.recorder(0))
            .await
            .err()
            .unwrap();

        assert!(matches!(err, MirrorError::Status { status: 404, .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_parse_http_date() {
        let parsed = parse_http_date("Sun, 06 Nov 1994 08:49:37 GMT").unwrap();
        assert_eq!(parsed.to_rfc3339(), "1994-11-06T08:49:37+00:00");
        assert!(parse_http_date("06/11/1994").is_err());
    }

    #[test]
    fn test_is_fresh_needs_date_and_matching_size() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("page.html");
        std::fs::write(&file, b"cached").unwrap();
        let meta = std::fs::metadata(&file).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, "6".parse().unwrap());
        assert!(!is_fresh(&headers, &meta, &file).unwrap());

        headers.insert(LAST_MODIFIED, OLD_DATE.parse().unwrap());
        assert!(is_fresh(&headers, &meta, &file).unwrap());

        headers.insert(CONTENT_LENGTH, "7".parse().unwrap());
        assert!(!is_fresh(&headers, &meta, &file).unwrap());
    }
}
