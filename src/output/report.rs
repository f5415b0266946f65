//! Final report of a crawl run

use crate::storage::RunStatus;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// Counters and status of a finished (or stopped) crawl
#[derive(Debug, Clone, Serialize)]
pub struct CrawlReport {
    /// `Completed` when the frontier drained, `Stopped` when cancelled
    pub status: RunStatus,
    pub seed_url: String,
    /// Pages fetched successfully, including ones that failed extraction
    pub pages_visited: u64,
    pub resources_downloaded: u64,
    /// Failed tasks, failed downloads, extraction and storage failures
    pub errors: u64,
    /// Generations dispatched
    pub generations: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

fn serialize_secs<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(elapsed.as_secs_f64())
}

impl CrawlReport {
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

impl fmt::Display for CrawlReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Crawl Report ===")?;
        writeln!(f)?;
        writeln!(f, "  Seed:                 {}", self.seed_url)?;
        writeln!(f, "  Status:               {}", self.status)?;
        writeln!(f, "  Pages visited:        {}", self.pages_visited)?;
        writeln!(f, "  Resources downloaded: {}", self.resources_downloaded)?;
        writeln!(f, "  Errors:               {}", self.errors)?;
        writeln!(f, "  Generations:          {}", self.generations)?;
        write!(
            f,
            "  Elapsed:              {:.1}s",
            self.elapsed.as_secs_f64()
        )
    }
}

/// Prints the report to stdout
pub fn print_report(report: &CrawlReport) {
    println!("{}", report);
}
