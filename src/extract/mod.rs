//! Page extraction
//!
//! The crawler hands every fetched page body to a `PageExtractor` and gets
//! back a `PageRecord`: the page's readable content plus the links to follow
//! and the resources to download. `HtmlExtractor` is the default.

mod charset;
mod html;

pub use charset::decode_body;
pub use html::HtmlExtractor;

use serde::Serialize;
use thiserror::Error;
use url::Url;

/// Errors raised while turning a page body into a record
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Page body is not markup: {0}")]
    NotHtml(String),
}

/// A table found on a page
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableRecord {
    pub title: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Everything extracted from one fetched page
///
/// `links` and `resources` hold absolute http(s) URLs, de-duplicated, in
/// document order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PageRecord {
    pub url: String,
    pub title: String,
    pub content: String,
    pub links: Vec<String>,
    pub resources: Vec<String>,
    pub tables: Vec<TableRecord>,
}

/// Turns raw page bytes into a `PageRecord`
///
/// `content_type` is the response's Content-Type header; it may name the
/// body's charset. `url` is the page's URL as requested and is the base
/// relative links resolve against.
pub trait PageExtractor: Send + Sync {
    fn extract(
        &self,
        body: &[u8],
        content_type: Option<&str>,
        url: &Url,
    ) -> Result<PageRecord, ExtractError>;
}
