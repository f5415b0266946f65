//! Resource downloader
//!
//! Downloads the images a page embeds, at most once per run and at most once
//! per storage across runs. Within a run both the resource URL and the
//! storage name derived from it are claimed, so two URLs that share a name
//! never write the same file. Bodies are streamed straight into a storage
//! sink.

use crate::crawler::fetcher::{classify_error, FailureKind, FetchClient, FetchOutcome};
use crate::crawler::frontier::VisitedSet;
use crate::crawler::retry::RetryPolicy;
use crate::crawler::stop::StopSignal;
use crate::state::TaskLifecycle;
use crate::storage::{digest_hex, sanitize_file_name, ResourceMeta, Storage, StorageResult};
use crate::url::{normalize_url, request_url};
use std::sync::Arc;
use url::Url;

/// Longest last-path-segment kept as a resource name
const MAX_NAME_LEN: usize = 100;

/// Extensions kept on hashed names
const IMAGE_EXTENSIONS: [&str; 7] = [".jpg", ".jpeg", ".png", ".gif", ".webp", ".svg", ".bmp"];

/// Why a resource was not downloaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another page of this run already claimed the URL
    AlreadyClaimed,
    /// Another URL of this run already claimed the same storage name
    NameTaken,
    /// Storage holds a resource with the same name
    AlreadyStored,
    /// The stop signal was set before the first attempt
    Stopped,
}

/// Result of one `download` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Saved {
        name: String,
        handle: String,
        bytes: u64,
    },
    Skipped(SkipReason),
    /// `kind` is `None` for storage failures and unusable URLs
    Failed {
        kind: Option<FailureKind>,
        detail: String,
    },
}

impl DownloadOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, DownloadOutcome::Saved { .. })
    }
}

/// Fetches resources through the shared client and retry policy
#[derive(Clone)]
pub struct ResourceDownloader {
    client: FetchClient,
    retry: RetryPolicy,
    storage: Arc<dyn Storage>,
    visited: Arc<VisitedSet>,
    stop: StopSignal,
}

impl ResourceDownloader {
    pub fn new(
        client: FetchClient,
        retry: RetryPolicy,
        storage: Arc<dyn Storage>,
        visited: Arc<VisitedSet>,
        stop: StopSignal,
    ) -> Self {
        Self {
            client,
            retry,
            storage,
            visited,
            stop,
        }
    }

    /// Downloads one resource referenced by `referer`
    ///
    /// # Arguments
    ///
    /// * `resource_url` - Absolute URL of the resource
    /// * `referer` - The page that embeds it; sent as the `Referer` header
    ///
    /// # Returns
    ///
    /// What happened; never an error, failures are reported in the outcome
    pub async fn download(&self, resource_url: &str, referer: &Url) -> DownloadOutcome {
        // Claimed and named by its normalized key, fetched as written
        let urls = normalize_url(resource_url)
            .and_then(|key| request_url(resource_url).map(|url| (key, url)));
        let (key, url) = match urls {
            Ok(urls) => urls,
            Err(e) => {
                tracing::debug!("Skipping unusable resource URL {}: {}", resource_url, e);
                return DownloadOutcome::Failed {
                    kind: None,
                    detail: e.to_string(),
                };
            }
        };

        if !self.visited.claim_resource(key.as_str()) {
            return DownloadOutcome::Skipped(SkipReason::AlreadyClaimed);
        }

        let name = resource_name(&key);
        if !self.visited.claim_resource_name(&name) {
            tracing::debug!("Resource {} maps to {}, already claimed this run", url, name);
            return DownloadOutcome::Skipped(SkipReason::NameTaken);
        }

        match self.storage.has_resource(&name) {
            Ok(true) => {
                tracing::debug!("Resource {} already stored as {}", url, name);
                return DownloadOutcome::Skipped(SkipReason::AlreadyStored);
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!("Failed to look up resource {}: {}", name, e);
                return DownloadOutcome::Failed {
                    kind: None,
                    detail: e.to_string(),
                };
            }
        }

        let meta = ResourceMeta {
            name,
            url: url.to_string(),
            referer: referer.to_string(),
        };

        let mut lifecycle = TaskLifecycle::new();
        let url_ref = &url;
        let meta_ref = &meta;
        let attempted = self
            .retry
            .attempt(url.as_str(), &self.stop, &mut lifecycle, move || {
                self.stream_once(url_ref, meta_ref)
            })
            .await;

        match attempted.outcome {
            FetchOutcome::Success(Ok((handle, bytes))) => {
                tracing::debug!("Saved {} ({} bytes) as {}", url, bytes, handle);
                DownloadOutcome::Saved {
                    name: meta.name,
                    handle,
                    bytes,
                }
            }
            FetchOutcome::Success(Err(e)) => {
                tracing::warn!("Failed to store resource {}: {}", url, e);
                DownloadOutcome::Failed {
                    kind: None,
                    detail: e.to_string(),
                }
            }
            FetchOutcome::FatalFailure(failure)
                if failure.kind == FailureKind::Stopped && attempted.attempts == 0 =>
            {
                DownloadOutcome::Skipped(SkipReason::Stopped)
            }
            FetchOutcome::RetryableFailure(failure) | FetchOutcome::FatalFailure(failure) => {
                DownloadOutcome::Failed {
                    kind: Some(failure.kind),
                    detail: failure.detail,
                }
            }
        }
    }

    /// One transfer attempt
    ///
    /// Network errors are returned as failures so the policy can retry them;
    /// storage errors end the sequence as `Success(Err(_))`. An uncommitted
    /// sink is discarded when dropped.
    async fn stream_once(
        &self,
        url: &Url,
        meta: &ResourceMeta,
    ) -> FetchOutcome<StorageResult<(String, u64)>> {
        let mut response = match self.client.send(url, Some(&meta.referer)).await {
            Ok(response) => response,
            Err(failure) => return failure.into(),
        };

        let mut sink = match self.storage.begin_resource(meta) {
            Ok(sink) => sink,
            Err(e) => return FetchOutcome::Success(Err(e)),
        };

        let mut bytes = 0u64;
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    if let Err(e) = sink.write_chunk(&chunk) {
                        return FetchOutcome::Success(Err(e));
                    }
                    bytes += chunk.len() as u64;
                }
                Ok(None) => break,
                Err(e) => return classify_error(&e).into(),
            }
        }

        FetchOutcome::Success(sink.commit().map(|handle| (handle, bytes)))
    }
}

/// Derives the stable storage name of a resource
///
/// The decoded, sanitized last path segment is used as-is unless it is empty,
/// longer than 100 characters, or the URL carries a query. Those fall back to
/// the first 32 hex digits of the URL's SHA-256 plus an image extension.
pub fn resource_name(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("");
    let decoded = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    let name = sanitize_file_name(&decoded);

    if name.is_empty() || name.chars().count() > MAX_NAME_LEN || url.query().is_some() {
        let digest = digest_hex(url.as_str());
        return format!("{}{}", &digest[..32], image_extension(url.path()));
    }

    name
}

fn image_extension(path: &str) -> &'static str {
    let lower = path.to_ascii_lowercase();
    IMAGE_EXTENSIONS
        .iter()
        .find(|ext| lower.ends_with(*ext))
        .copied()
        .unwrap_or(".jpg")
}
