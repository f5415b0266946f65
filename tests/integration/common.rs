//! Shared fixtures: configuration, page bodies, and a recording storage

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use url::Url;
use wiki_harvest::config::Config;
use wiki_harvest::extract::PageRecord;
use wiki_harvest::output::CrawlReport;
use wiki_harvest::storage::{ResourceMeta, ResourceSink, Storage, StorageResult};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration with no politeness delay
pub fn test_config(seed: &str, max_depth: u32) -> Config {
    let mut config = Config::default();
    config.crawler.seed_url = seed.to_string();
    config.crawler.max_depth = max_depth;
    config.crawler.workers = 4;
    config.crawler.delay_ms = 0;
    config.crawler.max_retries = 3;
    config.crawler.request_timeout_secs = 5;
    config.output.download_images = true;
    config
}

/// Builds an HTML page linking to `links` and embedding `images`
pub fn html_page(title: &str, links: &[String], images: &[String]) -> ResponseTemplate {
    let mut body = format!(
        "<html><head><title>{}</title></head><body><h1>{}</h1>",
        title, title
    );
    for link in links {
        body.push_str(&format!("<a href=\"{}\">{}</a>\n", link, link));
    }
    for image in images {
        body.push_str(&format!("<img src=\"{}\">\n", image));
    }
    body.push_str("</body></html>");

    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("content-type", "text/html")
}

/// Mounts a page at `route` that must be requested exactly `times` times
pub async fn mount_page(server: &MockServer, route: &str, page: ResponseTemplate, times: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(page)
        .expect(times)
        .mount(server)
        .await;
}

/// Number of requests the server received for `route`
pub async fn hits(server: &MockServer, route: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == route)
        .count()
}

/// Storage double that keeps everything in memory
#[derive(Default)]
pub struct RecordingStorage {
    pages: Mutex<Vec<PageRecord>>,
    raw_pages: Mutex<Vec<String>>,
    resources: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    reports: Mutex<Vec<CrawlReport>>,
}

impl RecordingStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// URLs of saved pages, in save order
    pub fn page_urls(&self) -> Vec<String> {
        self.pages
            .lock()
            .unwrap()
            .iter()
            .map(|page| page.url.clone())
            .collect()
    }

    pub fn page_title(&self, url: &str) -> Option<String> {
        self.pages
            .lock()
            .unwrap()
            .iter()
            .find(|page| page.url == url)
            .map(|page| page.title.clone())
    }

    pub fn raw_page_urls(&self) -> Vec<String> {
        self.raw_pages.lock().unwrap().clone()
    }

    pub fn resource(&self, name: &str) -> Option<Vec<u8>> {
        self.resources.lock().unwrap().get(name).cloned()
    }

    pub fn resource_count(&self) -> usize {
        self.resources.lock().unwrap().len()
    }

    pub fn reports(&self) -> Vec<CrawlReport> {
        self.reports.lock().unwrap().clone()
    }
}

impl Storage for RecordingStorage {
    fn save_page(&self, page: &PageRecord) -> StorageResult<()> {
        self.pages.lock().unwrap().push(page.clone());
        Ok(())
    }

    fn save_raw_page(&self, url: &Url, _body: &[u8]) -> StorageResult<()> {
        self.raw_pages.lock().unwrap().push(url.to_string());
        Ok(())
    }

    fn has_resource(&self, name: &str) -> StorageResult<bool> {
        Ok(self.resources.lock().unwrap().contains_key(name))
    }

    fn begin_resource(&self, meta: &ResourceMeta) -> StorageResult<Box<dyn ResourceSink>> {
        Ok(Box::new(RecordingSink {
            name: meta.name.clone(),
            buffer: Vec::new(),
            resources: Arc::clone(&self.resources),
        }))
    }

    fn record_run(&self, report: &CrawlReport) -> StorageResult<()> {
        self.reports.lock().unwrap().push(report.clone());
        Ok(())
    }
}

struct RecordingSink {
    name: String,
    buffer: Vec<u8>,
    resources: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl ResourceSink for RecordingSink {
    fn write_chunk(&mut self, chunk: &[u8]) -> StorageResult<()> {
        self.buffer.extend_from_slice(chunk);
        Ok(())
    }

    fn commit(self: Box<Self>) -> StorageResult<String> {
        let RecordingSink {
            name,
            buffer,
            resources,
        } = *self;
        resources.lock().unwrap().insert(name.clone(), buffer);
        Ok(name)
    }
}
