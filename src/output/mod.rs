//! Output module for crawl reports and statistics
//!
//! This module handles:
//! - The final report of a run (printed, and handed to storage)
//! - Run history and totals read back from the SQLite backend

mod report;
pub mod stats;

pub use report::{print_report, CrawlReport};
pub use stats::{load_statistics, print_statistics, CrawlStatistics};
