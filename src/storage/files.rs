//! Filesystem storage implementation
//!
//! Layout under the output directory:
//!
//! ```text
//! pages/<stem>.md            rendered page
//! pages/<stem>.json          url, title, links, images
//! pages/<stem>_tables.json   extracted tables (when enabled and present)
//! html/<stem>.html           raw page bytes (when enabled)
//! images/<name>              downloaded resources
//! index.md                   saved pages sorted by title
//! crawl_report.json          final run report
//! ```

use crate::extract::PageRecord;
use crate::output::CrawlReport;
use crate::storage::markdown::render_page;
use crate::storage::traits::{ResourceMeta, ResourceSink, Storage, StorageError, StorageResult};
use crate::storage::{digest_hex, sanitize_file_name};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use url::Url;

const MAX_STEM_CHARS: usize = 200;

/// A page written during this run, for the index
#[derive(Debug, Clone)]
struct SavedPage {
    title: String,
    stem: String,
}

/// Storage backend writing plain files
#[derive(Debug)]
pub struct FileStorage {
    root: PathBuf,
    save_tables: bool,
    saved: Mutex<Vec<SavedPage>>,
}

impl FileStorage {
    /// Creates the output directory tree
    ///
    /// # Arguments
    ///
    /// * `root` - Output directory; created if missing
    /// * `save_tables` - Whether extracted tables are written
    pub fn new(root: impl AsRef<Path>, save_tables: bool) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("pages"))?;
        fs::create_dir_all(root.join("images"))?;

        Ok(Self {
            root,
            save_tables,
            saved: Mutex::new(Vec::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pages_dir(&self) -> PathBuf {
        self.root.join("pages")
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    pub fn html_dir(&self) -> PathBuf {
        self.root.join("html")
    }

    fn resource_path(&self, name: &str) -> StorageResult<PathBuf> {
        validate_resource_name(name)?;
        Ok(self.images_dir().join(name))
    }

    fn write_index(&self, report: &CrawlReport) -> StorageResult<()> {
        let mut pages = self
            .saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        pages.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.stem.cmp(&b.stem)));

        let mut md = Vec::new();
        md.push("# Crawl Index".to_string());
        md.push(String::new());
        md.push(format!("Seed: {}", report.seed_url));
        md.push(format!("Pages saved: {}", pages.len()));
        md.push(String::new());
        for page in &pages {
            md.push(format!("- [{}](pages/{}.md)", page.title, page.stem));
        }
        md.push(String::new());

        fs::write(self.root.join("index.md"), md.join("\n"))?;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn save_page(&self, page: &PageRecord) -> StorageResult<()> {
        let stem = match Url::parse(&page.url) {
            Ok(url) => page_stem(&url),
            Err(_) => digest_hex(&page.url)[..32].to_string(),
        };
        let pages_dir = self.pages_dir();

        fs::write(
            pages_dir.join(format!("{}.md", stem)),
            render_page(page, self.save_tables),
        )?;

        let metadata = serde_json::json!({
            "url": page.url,
            "title": page.title,
            "links": page.links,
            "images": page.resources,
        });
        fs::write(
            pages_dir.join(format!("{}.json", stem)),
            serde_json::to_string_pretty(&metadata)?,
        )?;

        if self.save_tables && !page.tables.is_empty() {
            fs::write(
                pages_dir.join(format!("{}_tables.json", stem)),
                serde_json::to_string_pretty(&page.tables)?,
            )?;
        }

        tracing::debug!("Saved page {} -> {}", page.url, stem);
        self.saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SavedPage {
                title: page.title.clone(),
                stem,
            });
        Ok(())
    }

    fn save_raw_page(&self, url: &Url, body: &[u8]) -> StorageResult<()> {
        let html_dir = self.html_dir();
        fs::create_dir_all(&html_dir)?;
        fs::write(html_dir.join(format!("{}.html", page_stem(url))), body)?;
        Ok(())
    }

    fn has_resource(&self, name: &str) -> StorageResult<bool> {
        Ok(self.resource_path(name)?.is_file())
    }

    fn begin_resource(&self, meta: &ResourceMeta) -> StorageResult<Box<dyn ResourceSink>> {
        let dest = self.resource_path(&meta.name)?;
        let part = self.images_dir().join(format!("{}.part", meta.name));
        let file = File::create(&part)?;

        Ok(Box::new(FileSink {
            file: Some(BufWriter::new(file)),
            part,
            dest,
            committed: false,
        }))
    }

    fn record_run(&self, report: &CrawlReport) -> StorageResult<()> {
        self.write_index(report)?;
        fs::write(
            self.root.join("crawl_report.json"),
            serde_json::to_string_pretty(report)?,
        )?;
        Ok(())
    }
}

/// Writes to `<name>.part` and renames into place on commit
struct FileSink {
    file: Option<BufWriter<File>>,
    part: PathBuf,
    dest: PathBuf,
    committed: bool,
}

impl ResourceSink for FileSink {
    fn write_chunk(&mut self, chunk: &[u8]) -> StorageResult<()> {
        match self.file.as_mut() {
            Some(file) => Ok(file.write_all(chunk)?),
            None => Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "resource sink already closed",
            ))),
        }
    }

    fn commit(mut self: Box<Self>) -> StorageResult<String> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        fs::rename(&self.part, &self.dest)?;
        self.committed = true;
        Ok(self.dest.display().to_string())
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        if !self.committed {
            self.file.take();
            let _ = fs::remove_file(&self.part);
        }
    }
}

fn validate_resource_name(name: &str) -> StorageResult<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
    {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// File stem for a page URL
///
/// Built from the decoded path without its extension, sanitized and capped
/// at 200 characters. A query string adds an 8-digit hash suffix so that
/// `index.php?title=A` and `index.php?title=B` do not collide; an empty stem
/// falls back to a hash of the whole URL.
pub fn page_stem(url: &Url) -> String {
    let raw_path = url.path().trim_start_matches('/');
    let decoded = urlencoding::decode(raw_path)
        .map(|path| path.into_owned())
        .unwrap_or_else(|_| raw_path.to_string());

    let mut stem: String = sanitize_file_name(strip_extension(&decoded))
        .chars()
        .take(MAX_STEM_CHARS)
        .collect();

    if stem.is_empty() {
        return digest_hex(url.as_str())[..32].to_string();
    }

    if url.query().is_some() {
        stem.push('_');
        stem.push_str(&digest_hex(url.as_str())[..8]);
    }

    stem
}

/// Removes the extension of the last path segment, if any
fn strip_extension(path: &str) -> &str {
    let segment_start = path.rfind('/').map_or(0, |i| i + 1);
    match path[segment_start..].rfind('.') {
        Some(dot) if dot > 0 => &path[..segment_start + dot],
        _ => path,
    }
}
