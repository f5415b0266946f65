//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building the one pooled HTTP client with the configured header set
//! - GET requests for pages (buffered) and resources (streamed)
//! - Error classification into retryable and fatal failure kinds
//!
//! Retrying is not done here; see `crawler::retry`.

use crate::config::{Config, UserAgentConfig};
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, REFERER,
};
use reqwest::{Client, Response, StatusCode};
use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::time::Duration;
use url::Url;

/// Why a single fetch attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// TLS handshake or certificate problem
    Tls,
    /// Connection refused, reset, or aborted
    Connection,
    /// The attempt exceeded the request timeout
    Timeout,
    /// 5xx, or any other non-2xx status that is not a 4xx
    HttpTransient(u16),
    /// 4xx status
    HttpClient(u16),
    /// Anything not covered above
    Other,
    /// The stop signal was observed before the attempt started
    Stopped,
}

impl FailureKind {
    /// Returns true if another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::HttpClient(_) | Self::Stopped)
    }

    /// Multiplier of the base delay slept after a retryable failure
    pub fn backoff_factor(&self) -> u32 {
        match self {
            Self::Connection | Self::Timeout => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tls => write!(f, "tls"),
            Self::Connection => write!(f, "connection"),
            Self::Timeout => write!(f, "timeout"),
            Self::HttpTransient(status) => write!(f, "http {}", status),
            Self::HttpClient(status) => write!(f, "http {}", status),
            Self::Other => write!(f, "other"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// A classified failure plus a human-readable description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub kind: FailureKind,
    pub detail: String,
}

impl FetchFailure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn stopped() -> Self {
        Self::new(FailureKind::Stopped, "stop requested")
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.kind, self.detail)
    }
}

/// Result of one fetch attempt, or of a whole retry sequence
#[derive(Debug)]
pub enum FetchOutcome<T> {
    Success(T),
    RetryableFailure(FetchFailure),
    FatalFailure(FetchFailure),
}

impl<T> FetchOutcome<T> {
    pub fn into_result(self) -> Result<T, FetchFailure> {
        match self {
            Self::Success(value) => Ok(value),
            Self::RetryableFailure(failure) | Self::FatalFailure(failure) => Err(failure),
        }
    }
}

impl<T> From<FetchFailure> for FetchOutcome<T> {
    fn from(failure: FetchFailure) -> Self {
        if failure.kind.is_retryable() {
            Self::RetryableFailure(failure)
        } else {
            Self::FatalFailure(failure)
        }
    }
}

/// A page body as served, with the Content-Type it was served under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

/// Builds an HTTP client with the configured default headers
///
/// The client is built once per crawl and shared by every worker so that
/// connections are pooled. Redirects follow reqwest's default limited policy.
///
/// # Arguments
///
/// * `config` - The header configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use wiki_harvest::config::UserAgentConfig;
/// use wiki_harvest::crawler::build_http_client;
///
/// let client = build_http_client(&UserAgentConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&config.accept) {
        headers.insert(ACCEPT, value);
    }
    if let Ok(value) = HeaderValue::from_str(&config.accept_language) {
        headers.insert(ACCEPT_LANGUAGE, value);
    }
    headers.insert(
        HeaderName::from_static("upgrade-insecure-requests"),
        HeaderValue::from_static("1"),
    );

    Client::builder()
        .user_agent(config.agent.as_str())
        .default_headers(headers)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Issues single GET attempts and classifies what went wrong
#[derive(Debug, Clone)]
pub struct FetchClient {
    client: Client,
    timeout: Duration,
}

impl FetchClient {
    /// Builds the shared client from the crawl configuration
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let client = build_http_client(&config.user_agent)?;
        Ok(Self::from_parts(client, config.crawler.request_timeout()))
    }

    /// Wraps an existing client; `timeout` applies to each request
    pub fn from_parts(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Sends one GET and checks the status
    ///
    /// The body is left unread so the caller can stream it.
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to fetch
    /// * `referer` - Value for the `Referer` header, if any
    ///
    /// # Returns
    ///
    /// * `Ok(Response)` - A 2xx response
    /// * `Err(FetchFailure)` - Transport failure or non-2xx status
    pub async fn send(&self, url: &Url, referer: Option<&str>) -> Result<Response, FetchFailure> {
        let mut request = self.client.get(url.clone()).timeout(self.timeout);
        if let Some(referer) = referer {
            request = request.header(REFERER, referer);
        }

        let response = request.send().await.map_err(|e| classify_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }

        Ok(response)
    }

    /// Fetches a page and buffers its whole body
    ///
    /// The body is kept undecoded; the extractor picks the charset.
    pub async fn fetch(&self, url: &Url) -> FetchOutcome<FetchedPage> {
        let response = match self.send(url, None).await {
            Ok(response) => response,
            Err(failure) => return failure.into(),
        };

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        match response.bytes().await {
            Ok(body) => FetchOutcome::Success(FetchedPage {
                body: body.to_vec(),
                content_type,
            }),
            Err(e) => classify_error(&e).into(),
        }
    }
}

/// Classifies a non-2xx status code
pub fn classify_status(status: StatusCode) -> FetchFailure {
    let code = status.as_u16();
    let reason = status.canonical_reason().unwrap_or("unknown status");
    if status.is_client_error() {
        FetchFailure::new(FailureKind::HttpClient(code), format!("HTTP {} {}", code, reason))
    } else {
        FetchFailure::new(
            FailureKind::HttpTransient(code),
            format!("HTTP {} {}", code, reason),
        )
    }
}

/// Classifies a transport error from reqwest
///
/// TLS problems are recognised by wording anywhere in the error's source
/// chain, since they surface as connect errors from several layers.
pub fn classify_error(error: &reqwest::Error) -> FetchFailure {
    let causes = source_chain(error);
    let detail = if causes.is_empty() {
        error.to_string()
    } else {
        format!("{}: {}", error, causes)
    };

    let kind = if mentions_tls(&causes) {
        FailureKind::Tls
    } else if error.is_timeout() {
        FailureKind::Timeout
    } else {
        match io_error_kind(error) {
            Some(io::ErrorKind::TimedOut) => FailureKind::Timeout,
            Some(
                io::ErrorKind::ConnectionRefused
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted,
            ) => FailureKind::Connection,
            _ if error.is_connect() => FailureKind::Connection,
            _ => match error.status() {
                Some(status) => return classify_status(status),
                None => FailureKind::Other,
            },
        }
    };

    FetchFailure::new(kind, detail)
}

/// Messages of every error below the top-level one, joined with ": "
fn source_chain(error: &reqwest::Error) -> String {
    let mut messages = Vec::new();
    let mut source = error.source();
    while let Some(err) = source {
        messages.push(err.to_string());
        source = err.source();
    }
    messages.join(": ")
}

fn mentions_tls(text: &str) -> bool {
    let lowered = text.to_lowercase();
    ["tls", "ssl", "certificate", "handshake"]
        .iter()
        .any(|needle| lowered.contains(needle))
}

/// Finds the first `io::Error` in the source chain
fn io_error_kind(error: &reqwest::Error) -> Option<io::ErrorKind> {
    let mut source: Option<&(dyn StdError + 'static)> = error.source();
    while let Some(err) = source {
        if let Some(io_error) = err.downcast_ref::<io::Error>() {
            return Some(io_error.kind());
        }
        source = err.source();
    }
    None
}
