//! Crawler module for scoped, generation-by-generation fetching
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching and failure classification
//! - Bounded retries with jittered delays
//! - The frontier, its visited sets, and link admission
//! - Resource downloads
//! - Overall crawl coordination

mod coordinator;
mod downloader;
mod fetcher;
mod frontier;
mod retry;
mod stop;

pub use coordinator::{run_crawl, Coordinator};
pub use downloader::{resource_name, DownloadOutcome, ResourceDownloader, SkipReason};
pub use fetcher::{
    build_http_client, classify_error, classify_status, FailureKind, FetchClient, FetchFailure,
    FetchOutcome, FetchedPage,
};
pub use frontier::{
    Admission, AdmissionPolicy, CrawlTask, Frontier, RejectReason, VisitedSet,
};
pub use retry::{Attempted, RetryPolicy};
pub use stop::StopSignal;
