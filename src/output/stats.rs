//! Statistics generation from the crawl database
//!
//! This module provides functionality for extracting and displaying
//! run history and totals from a SQLite storage backend.

use crate::storage::{RunRecord, RunStatus, SqliteStorage, StorageResult};

/// How many runs `--stats` shows
const RECENT_RUNS: usize = 10;

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Pages stored across all runs
    pub total_pages: u64,

    /// Resources stored across all runs
    pub total_resources: u64,

    /// Size of all stored resources
    pub total_resource_bytes: u64,

    /// Most recent runs, newest first
    pub recent_runs: Vec<RunRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The database to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to query statistics
pub fn load_statistics(storage: &SqliteStorage) -> StorageResult<CrawlStatistics> {
    Ok(CrawlStatistics {
        total_pages: storage.count_pages()?,
        total_resources: storage.count_resources()?,
        total_resource_bytes: storage.total_resource_bytes()?,
        recent_runs: storage.list_runs(RECENT_RUNS)?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Pages stored: {}", stats.total_pages);
    println!(
        "  Resources stored: {} ({})",
        stats.total_resources,
        format_bytes(stats.total_resource_bytes)
    );
    println!();

    if stats.recent_runs.is_empty() {
        println!("No runs recorded.");
        return;
    }

    println!("Recent Runs:");
    for run in &stats.recent_runs {
        println!(
            "  #{} {} [{}] pages={} resources={} errors={} generations={}",
            run.id,
            run.started_at,
            run.status,
            run.pages_visited,
            run.resources_downloaded,
            run.errors,
            run.generations
        );
        println!("      seed: {}", run.seed_url);
    }
    println!();

    let completed = stats
        .recent_runs
        .iter()
        .filter(|r| r.status == RunStatus::Completed)
        .count();
    println!(
        "Completed: {} of {} recent runs",
        completed,
        stats.recent_runs.len()
    );
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
