//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.
//! One connection is shared by all workers behind a mutex. Resource sinks
//! write each chunk as its own row while the transfer runs, so the lock is
//! held per chunk and memory stays bounded by the chunk size. Commit copies
//! the chunks into the resource's blob and drops the upload.

use crate::extract::PageRecord;
use crate::output::CrawlReport;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{ResourceMeta, ResourceSink, Storage, StorageResult};
use crate::storage::{RunRecord, RunStatus};
use chrono::Utc;
use rusqlite::{params, Connection, DatabaseName, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use url::Url;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
    run_id: Option<i64>,
    save_tables: bool,
}

fn lock(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `save_tables` - Whether extracted tables are stored
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path, save_tables: bool) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        // Uploads left behind by an interrupted process
        conn.execute("DELETE FROM resource_uploads", [])?;

        Ok(Self::from_connection(conn, save_tables))
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self::from_connection(conn, true))
    }

    fn from_connection(conn: Connection, save_tables: bool) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            run_id: None,
            save_tables,
        }
    }

    /// Inserts a `running` row for the crawl about to start
    ///
    /// Pages and resources saved afterwards are tagged with this run, and
    /// `record_run` finalizes the row.
    pub fn begin_run(&mut self, seed_url: &str, config_hash: Option<&str>) -> StorageResult<i64> {
        let conn = lock(&self.conn);
        conn.execute(
            "INSERT INTO runs (started_at, seed_url, config_hash, status) VALUES (?1, ?2, ?3, ?4)",
            params![
                Utc::now().to_rfc3339(),
                seed_url,
                config_hash,
                RunStatus::Running.to_db_string()
            ],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);

        self.run_id = Some(id);
        Ok(id)
    }

    pub fn run_id(&self) -> Option<i64> {
        self.run_id
    }

    /// Returns the most recent runs, newest first
    pub fn list_runs(&self, limit: usize) -> StorageResult<Vec<RunRecord>> {
        let conn = lock(&self.conn);
        let mut stmt = conn.prepare(
            "SELECT id, started_at, finished_at, seed_url, config_hash, status,
                    pages_visited, resources_downloaded, errors, generations
             FROM runs ORDER BY id DESC LIMIT ?1",
        )?;

        let runs = stmt
            .query_map(params![limit as i64], |row| {
                Ok(RunRecord {
                    id: row.get(0)?,
                    started_at: row.get(1)?,
                    finished_at: row.get(2)?,
                    seed_url: row.get(3)?,
                    config_hash: row.get(4)?,
                    status: RunStatus::from_db_string(&row.get::<_, String>(5)?)
                        .unwrap_or(RunStatus::Running),
                    pages_visited: row.get::<_, i64>(6)? as u64,
                    resources_downloaded: row.get::<_, i64>(7)? as u64,
                    errors: row.get::<_, i64>(8)? as u64,
                    generations: row.get::<_, i64>(9)? as u32,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(runs)
    }

    pub fn count_pages(&self) -> StorageResult<u64> {
        let count: i64 = lock(&self.conn).query_row("SELECT COUNT(*) FROM pages", [], |row| {
            row.get(0)
        })?;
        Ok(count as u64)
    }

    pub fn count_resources(&self) -> StorageResult<u64> {
        let count: i64 = lock(&self.conn).query_row(
            "SELECT COUNT(*) FROM resources",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Total bytes of all stored resources
    pub fn total_resource_bytes(&self) -> StorageResult<u64> {
        let total: i64 = lock(&self.conn).query_row(
            "SELECT COALESCE(SUM(size), 0) FROM resources",
            [],
            |row| row.get(0),
        )?;
        Ok(total as u64)
    }

    /// Reads back a stored resource's bytes
    pub fn resource_data(&self, name: &str) -> StorageResult<Option<Vec<u8>>> {
        let data = lock(&self.conn)
            .query_row(
                "SELECT data FROM resources WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(data)
    }

    /// Looks up a stored page's title by URL
    pub fn page_title(&self, url: &str) -> StorageResult<Option<String>> {
        let title = lock(&self.conn)
            .query_row(
                "SELECT title FROM pages WHERE url = ?1",
                params![url],
                |row| row.get(0),
            )
            .optional()?;
        Ok(title)
    }
}

impl Storage for SqliteStorage {
    fn save_page(&self, page: &PageRecord) -> StorageResult<()> {
        let links = serde_json::to_string(&page.links)?;
        let images = serde_json::to_string(&page.resources)?;
        let tables = if self.save_tables && !page.tables.is_empty() {
            Some(serde_json::to_string(&page.tables)?)
        } else {
            None
        };

        lock(&self.conn).execute(
            "INSERT INTO pages (url, title, content, links, images, tables, run_id, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(url) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                links = excluded.links,
                images = excluded.images,
                tables = excluded.tables,
                run_id = excluded.run_id,
                fetched_at = excluded.fetched_at",
            params![
                page.url,
                page.title,
                page.content,
                links,
                images,
                tables,
                self.run_id,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn save_raw_page(&self, url: &Url, body: &[u8]) -> StorageResult<()> {
        lock(&self.conn).execute(
            "INSERT INTO pages (url, raw_html, run_id, fetched_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(url) DO UPDATE SET raw_html = excluded.raw_html",
            params![url.as_str(), body, self.run_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn has_resource(&self, name: &str) -> StorageResult<bool> {
        let found = lock(&self.conn)
            .query_row(
                "SELECT 1 FROM resources WHERE name = ?1",
                params![name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn begin_resource(&self, meta: &ResourceMeta) -> StorageResult<Box<dyn ResourceSink>> {
        let upload_id = {
            let conn = lock(&self.conn);
            conn.execute(
                "INSERT INTO resource_uploads (name, started_at) VALUES (?1, ?2)",
                params![meta.name, Utc::now().to_rfc3339()],
            )?;
            conn.last_insert_rowid()
        };

        Ok(Box::new(SqliteSink {
            conn: Arc::clone(&self.conn),
            meta: meta.clone(),
            run_id: self.run_id,
            upload_id,
            next_seq: 0,
            committed: false,
        }))
    }

    fn record_run(&self, report: &CrawlReport) -> StorageResult<()> {
        let conn = lock(&self.conn);
        let finished_at = report.finished_at.to_rfc3339();

        match self.run_id {
            Some(id) => {
                conn.execute(
                    "UPDATE runs SET finished_at = ?1, status = ?2, pages_visited = ?3,
                            resources_downloaded = ?4, errors = ?5, generations = ?6
                     WHERE id = ?7",
                    params![
                        finished_at,
                        report.status.to_db_string(),
                        report.pages_visited as i64,
                        report.resources_downloaded as i64,
                        report.errors as i64,
                        report.generations,
                        id
                    ],
                )?;
            }
            None => {
                conn.execute(
                    "INSERT INTO runs (started_at, finished_at, seed_url, status, pages_visited,
                                       resources_downloaded, errors, generations)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        report.started_at.to_rfc3339(),
                        finished_at,
                        report.seed_url,
                        report.status.to_db_string(),
                        report.pages_visited as i64,
                        report.resources_downloaded as i64,
                        report.errors as i64,
                        report.generations
                    ],
                )?;
            }
        }
        Ok(())
    }
}

/// Streams a resource into `resource_chunks` and assembles it on commit
struct SqliteSink {
    conn: Arc<Mutex<Connection>>,
    meta: ResourceMeta,
    run_id: Option<i64>,
    upload_id: i64,
    next_seq: i64,
    committed: bool,
}

impl ResourceSink for SqliteSink {
    fn write_chunk(&mut self, chunk: &[u8]) -> StorageResult<()> {
        if chunk.is_empty() {
            return Ok(());
        }

        lock(&self.conn).execute(
            "INSERT INTO resource_chunks (upload_id, seq, data) VALUES (?1, ?2, ?3)",
            params![self.upload_id, self.next_seq, chunk],
        )?;
        self.next_seq += 1;
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> StorageResult<String> {
        let mut conn = lock(&self.conn);
        let tx = conn.transaction()?;

        let size: i64 = tx.query_row(
            "SELECT COALESCE(SUM(length(data)), 0) FROM resource_chunks WHERE upload_id = ?1",
            params![self.upload_id],
            |row| row.get(0),
        )?;

        tx.execute(
            "INSERT OR REPLACE INTO resources (name, url, referer, size, data, run_id, downloaded_at)
             VALUES (?1, ?2, ?3, ?4, zeroblob(?4), ?5, ?6)",
            params![
                self.meta.name,
                self.meta.url,
                self.meta.referer,
                size,
                self.run_id,
                Utc::now().to_rfc3339()
            ],
        )?;
        let row_id = tx.last_insert_rowid();

        {
            let mut blob = tx.blob_open(DatabaseName::Main, "resources", "data", row_id, false)?;
            let mut stmt = tx.prepare(
                "SELECT data FROM resource_chunks WHERE upload_id = ?1 ORDER BY seq",
            )?;
            let mut rows = stmt.query(params![self.upload_id])?;
            let mut offset = 0usize;
            while let Some(row) = rows.next()? {
                let chunk: Vec<u8> = row.get(0)?;
                blob.write_at(&chunk, offset)?;
                offset += chunk.len();
            }
        }

        tx.execute(
            "DELETE FROM resource_uploads WHERE id = ?1",
            params![self.upload_id],
        )?;
        tx.commit()?;
        drop(conn);

        self.committed = true;
        Ok(format!("resources/{}", row_id))
    }
}

impl Drop for SqliteSink {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(e) = lock(&self.conn).execute(
            "DELETE FROM resource_uploads WHERE id = ?1",
            params![self.upload_id],
        ) {
            tracing::warn!("Failed to discard upload of {}: {}", self.meta.name, e);
        }
    }
}
