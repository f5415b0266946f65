//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Wiki-Harvest
//! database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    seed_url TEXT NOT NULL,
    config_hash TEXT,
    status TEXT NOT NULL,
    pages_visited INTEGER NOT NULL DEFAULT 0,
    resources_downloaded INTEGER NOT NULL DEFAULT 0,
    errors INTEGER NOT NULL DEFAULT 0,
    generations INTEGER NOT NULL DEFAULT 0
);

-- Extracted pages, one row per URL
CREATE TABLE IF NOT EXISTS pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL DEFAULT '',
    content TEXT NOT NULL DEFAULT '',
    links TEXT NOT NULL DEFAULT '[]',
    images TEXT NOT NULL DEFAULT '[]',
    tables TEXT,
    raw_html BLOB,
    run_id INTEGER REFERENCES runs(id),
    fetched_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_pages_run ON pages(run_id);

-- Downloaded resources, keyed by their stable name
CREATE TABLE IF NOT EXISTS resources (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    url TEXT NOT NULL,
    referer TEXT NOT NULL,
    size INTEGER NOT NULL,
    data BLOB NOT NULL,
    run_id INTEGER REFERENCES runs(id),
    downloaded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_resources_run ON resources(run_id);

-- Resource downloads still in flight
CREATE TABLE IF NOT EXISTS resource_uploads (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    started_at TEXT NOT NULL
);

-- Received chunks of an upload, in arrival order
CREATE TABLE IF NOT EXISTS resource_chunks (
    upload_id INTEGER NOT NULL REFERENCES resource_uploads(id) ON DELETE CASCADE,
    seq INTEGER NOT NULL,
    data BLOB NOT NULL,
    PRIMARY KEY (upload_id, seq)
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
