//! HTML extractor built on `scraper`
//!
//! This module parses HTML content to extract:
//! - The page title
//! - Readable text from the main content container
//! - Links to follow (from <a> tags)
//! - Images to download (from <img> tags)
//! - Tables with caption, headers, and rows

use crate::extract::{decode_body, ExtractError, PageExtractor, PageRecord, TableRecord};
use crate::url::resolve_link;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Containers tried in order for the page's main content
const CONTENT_SELECTORS: &[&str] = &[
    "#mw-content-text",
    "#bodyContent",
    ".mw-parser-output",
    "article",
    "main",
    "#content",
    ".content",
];

/// Elements whose text is never part of the content
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript"];

const UNTITLED_PAGE: &str = "Untitled";
const UNTITLED_TABLE: &str = "Untitled table";

/// Default extractor for HTML pages
#[derive(Debug, Clone, Default)]
pub struct HtmlExtractor;

impl HtmlExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl PageExtractor for HtmlExtractor {
    /// Parses a page
    ///
    /// # Link Extraction Rules
    ///
    /// **Include:**
    /// - `<a href="...">` anywhere in the document
    ///
    /// **Exclude:**
    /// - `<a href="..." download>`
    /// - empty and fragment-only hrefs
    /// - `javascript:`, `mailto:`, `tel:` links
    /// - Data URIs
    ///
    /// `rel="nofollow"` links are followed.
    fn extract(
        &self,
        body: &[u8],
        content_type: Option<&str>,
        url: &Url,
    ) -> Result<PageRecord, ExtractError> {
        let text = decode_body(body, content_type);
        if !text.contains('<') {
            return Err(ExtractError::NotHtml(format!(
                "{} bytes without any markup",
                body.len()
            )));
        }

        let document = Html::parse_document(&text);

        Ok(PageRecord {
            url: url.to_string(),
            title: extract_title(&document),
            content: extract_content(&document),
            links: extract_links(&document, url),
            resources: extract_images(&document, url),
            tables: extract_tables(&document),
        })
    }
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Collects an element's text with whitespace trimmed
fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// First `<h1>`, else `<title>`, else a placeholder
fn extract_title(document: &Html) -> String {
    ["h1", "title"]
        .iter()
        .filter_map(|css| selector(css))
        .find_map(|sel| {
            document
                .select(&sel)
                .next()
                .map(element_text)
                .filter(|s| !s.is_empty())
        })
        .unwrap_or_else(|| UNTITLED_PAGE.to_string())
}

/// Text of the main content container, one trimmed line per text line
fn extract_content(document: &Html) -> String {
    let container = CONTENT_SELECTORS
        .iter()
        .filter_map(|css| selector(css))
        .find_map(|sel| document.select(&sel).next())
        .or_else(|| selector("body").and_then(|sel| document.select(&sel).next()));

    let Some(container) = container else {
        return String::new();
    };

    let mut raw = String::new();
    for node in container.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        let skipped = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .map_or(false, |e| SKIPPED_ELEMENTS.contains(&e.name()))
        });
        if !skipped {
            raw.push_str(text);
        }
    }

    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Pushes `url` unless it was already seen
fn push_unique(out: &mut Vec<String>, seen: &mut HashSet<String>, url: Url) {
    let url = url.to_string();
    if seen.insert(url.clone()) {
        out.push(url);
    }
}

fn extract_links(document: &Html, base_url: &Url) -> Vec<String> {
    let mut links = Vec::new();
    let mut seen = HashSet::new();

    if let Some(a_selector) = selector("a[href]") {
        for element in document.select(&a_selector) {
            if element.value().attr("download").is_some() {
                continue;
            }

            if let Some(absolute_url) = element
                .value()
                .attr("href")
                .and_then(|href| resolve_link(href, base_url))
            {
                push_unique(&mut links, &mut seen, absolute_url);
            }
        }
    }

    links
}

fn extract_images(document: &Html, base_url: &Url) -> Vec<String> {
    let mut images = Vec::new();
    let mut seen = HashSet::new();

    if let Some(img_selector) = selector("img[src]") {
        for element in document.select(&img_selector) {
            if let Some(absolute_url) = element
                .value()
                .attr("src")
                .and_then(|src| resolve_link(src, base_url))
            {
                push_unique(&mut images, &mut seen, absolute_url);
            }
        }
    }

    images
}

/// Extracts every `<table>`
///
/// Headers come from `<thead> <th>` cells, or failing that from the `<th>`
/// cells of the first row. When headers were found the first row is not
/// repeated among the data rows.
fn extract_tables(document: &Html) -> Vec<TableRecord> {
    let (
        Some(table_sel),
        Some(caption_sel),
        Some(thead_th_sel),
        Some(tr_sel),
        Some(th_sel),
        Some(cell_sel),
    ) = (
        selector("table"),
        selector("caption"),
        selector("thead th"),
        selector("tr"),
        selector("th"),
        selector("td, th"),
    )
    else {
        return Vec::new();
    };

    document
        .select(&table_sel)
        .map(|table| {
            let title = table
                .select(&caption_sel)
                .next()
                .map(element_text)
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| UNTITLED_TABLE.to_string());

            let mut headers: Vec<String> = table.select(&thead_th_sel).map(element_text).collect();
            if headers.is_empty() {
                if let Some(first_row) = table.select(&tr_sel).next() {
                    headers = first_row.select(&th_sel).map(element_text).collect();
                }
            }

            let skip = usize::from(!headers.is_empty());
            let rows = table
                .select(&tr_sel)
                .skip(skip)
                .map(|tr| tr.select(&cell_sel).map(element_text).collect::<Vec<_>>())
                .filter(|cells| !cells.is_empty())
                .collect();

            TableRecord {
                title,
                headers,
                rows,
            }
        })
        .collect()
}
