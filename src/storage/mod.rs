//! Storage module for persisting crawl output
//!
//! This module handles everything the crawl writes, including:
//! - Extracted pages (markdown, JSON metadata, tables)
//! - Raw page bytes when requested
//! - Downloaded resources, streamed through a sink and published on commit
//! - A record of each finished run
//!
//! Two backends implement the `Storage` trait: `FileStorage` writes a
//! directory tree, `SqliteStorage` writes a single database.

mod files;
mod markdown;
mod schema;
mod sqlite;
mod traits;

pub use files::FileStorage;
pub use markdown::render_page;
pub use sqlite::SqliteStorage;
pub use traits::{ResourceMeta, ResourceSink, Storage, StorageError, StorageResult};

use crate::config::{OutputConfig, StorageBackend};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Opens the configured storage backend
///
/// # Arguments
///
/// * `config` - The output configuration
/// * `seed_url` - Recorded with the run (SQLite only)
/// * `config_hash` - Hash of the config file, if one was used (SQLite only)
///
/// # Returns
///
/// * `Ok(Arc<dyn Storage>)` - Ready to share with the crawl workers
/// * `Err(StorageError)` - Failed to create directories or open the database
pub fn open_storage(
    config: &OutputConfig,
    seed_url: &str,
    config_hash: Option<&str>,
) -> StorageResult<Arc<dyn Storage>> {
    match config.backend {
        StorageBackend::Files => Ok(Arc::new(FileStorage::new(
            &config.directory,
            config.save_tables,
        )?)),
        StorageBackend::Sqlite => {
            std::fs::create_dir_all(&config.directory)?;
            let mut storage = SqliteStorage::new(&config.database_path(), config.save_tables)?;
            storage.begin_run(seed_url, config_hash)?;
            Ok(Arc::new(storage))
        }
    }
}

/// Represents a crawl run in the database
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub seed_url: String,
    pub config_hash: Option<String>,
    pub status: RunStatus,
    pub pages_visited: u64,
    pub resources_downloaded: u64,
    pub errors: u64,
    pub generations: u32,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Stopped,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "stopped" => Some(Self::Stopped),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Hex SHA-256 of `input`
pub fn digest_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Replaces characters that are unsafe in file names
///
/// Path separators, wildcards, quotes, angle brackets, pipes, control
/// characters and spaces all become `_`. Leading dots are dropped so the
/// result is never hidden or a relative path component.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '\\' | '/' | '*' | '?' | ':' | '"' | '<' | '>' | '|' | ' ' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    cleaned.trim_start_matches('.').to_string()
}
