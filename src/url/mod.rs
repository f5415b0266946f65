//! URL handling module for Wiki-Harvest
//!
//! This module provides URL normalization, authority extraction, and
//! resolution of hrefs found in pages against the page's own URL.

mod domain;
mod normalize;

use crate::UrlError;
use url::Url;

// Re-export main functions
pub use domain::extract_authority;
pub use normalize::normalize_url;

/// Resolves an href to an absolute http(s) URL
///
/// Returns None if the href should be excluded:
/// - empty or fragment-only (same page anchors)
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - hrefs that cannot be joined onto `base_url`
/// - non-HTTP(S) URLs after resolution
///
/// # Examples
///
/// ```
/// use url::Url;
/// use wiki_harvest::url::resolve_link;
///
/// let base = Url::parse("https://example.com/wiki/Page").unwrap();
/// let link = resolve_link("Other", &base).unwrap();
/// assert_eq!(link.as_str(), "https://example.com/wiki/Other");
/// assert!(resolve_link("#top", &base).is_none());
/// ```
pub fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if lowered.starts_with("javascript:")
        || lowered.starts_with("mailto:")
        || lowered.starts_with("tel:")
        || lowered.starts_with("data:")
    {
        return None;
    }

    let absolute_url = base_url.join(href).ok()?;
    if absolute_url.scheme() == "http" || absolute_url.scheme() == "https" {
        Some(absolute_url)
    } else {
        None
    }
}

/// Parses a link into the URL that is actually requested
///
/// Unlike `normalize_url`, the path and query are kept exactly as written so
/// that directory-style URLs keep their trailing slash. Only the fragment,
/// which never reaches the server, is dropped.
///
/// # Examples
///
/// ```
/// use wiki_harvest::url::request_url;
///
/// let url = request_url("https://example.com/docs/#intro").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/docs/");
/// ```
pub fn request_url(link: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(link.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingDomain);
    }

    url.set_fragment(None);
    Ok(url)
}
