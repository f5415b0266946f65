//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::extract::PageRecord;
use crate::output::CrawlReport;
use thiserror::Error;
use url::Url;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid resource name: {0}")]
    InvalidName(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Identifies a resource being downloaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceMeta {
    /// Stable storage name derived from the URL
    pub name: String,
    /// Where the resource was fetched from
    pub url: String,
    /// The page that referenced it
    pub referer: String,
}

/// Receives a resource body chunk by chunk
///
/// Nothing is visible to readers of the storage until `commit` succeeds. A
/// sink dropped without committing discards what was written.
pub trait ResourceSink: Send {
    fn write_chunk(&mut self, chunk: &[u8]) -> StorageResult<()>;

    /// Publishes the resource and returns a handle to it (a path or row id)
    fn commit(self: Box<Self>) -> StorageResult<String>;
}

/// Trait for storage backend implementations
///
/// Every method takes `&self`: a backend is shared by all workers of a crawl
/// and guards its own state.
pub trait Storage: Send + Sync {
    /// Persists an extracted page
    fn save_page(&self, page: &PageRecord) -> StorageResult<()>;

    /// Persists the raw bytes of a fetched page
    fn save_raw_page(&self, url: &Url, body: &[u8]) -> StorageResult<()>;

    /// Returns true if a resource with this name is already stored
    fn has_resource(&self, name: &str) -> StorageResult<bool>;

    /// Opens a sink for a resource download
    fn begin_resource(&self, meta: &ResourceMeta) -> StorageResult<Box<dyn ResourceSink>>;

    /// Records the outcome of a finished run
    fn record_run(&self, _report: &CrawlReport) -> StorageResult<()> {
        Ok(())
    }
}
