//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the main crawl loop that coordinates all aspects of
//! the crawling process, including:
//! - Seeding the frontier and scoping it to the seed's authority
//! - Dispatching one generation (one depth level) at a time to a worker pool
//! - Fetching, extracting, and storing each page
//! - Downloading the resources a page embeds
//! - Honoring the stop signal and producing the final report

use crate::config::Config;
use crate::crawler::downloader::{DownloadOutcome, ResourceDownloader, SkipReason};
use crate::crawler::fetcher::{FailureKind, FetchClient, FetchOutcome};
use crate::crawler::frontier::{Admission, AdmissionPolicy, CrawlTask, Frontier, VisitedSet};
use crate::crawler::retry::RetryPolicy;
use crate::crawler::stop::StopSignal;
use crate::extract::PageExtractor;
use crate::output::CrawlReport;
use crate::state::TaskLifecycle;
use crate::storage::{RunStatus, Storage};
use crate::HarvestError;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use url::Url;

/// Everything a worker needs, shared read-only across a run
struct WorkerContext {
    client: FetchClient,
    retry: RetryPolicy,
    admission: AdmissionPolicy,
    visited: Arc<VisitedSet>,
    extractor: Arc<dyn PageExtractor>,
    storage: Arc<dyn Storage>,
    downloader: ResourceDownloader,
    stop: StopSignal,
    save_html: bool,
    download_images: bool,
}

/// What one task contributed to the run
#[derive(Debug, Default)]
struct TaskReport {
    visited: bool,
    errors: u64,
    resources_downloaded: u64,
    children: Vec<CrawlTask>,
    /// The stop signal cut this task short
    interrupted: bool,
}

impl TaskReport {
    fn interrupted() -> Self {
        Self {
            interrupted: true,
            ..Self::default()
        }
    }
}

/// Main crawler coordinator structure
pub struct Coordinator {
    context: Arc<WorkerContext>,
    frontier: Frontier,
    seed: Url,
    workers: usize,
    stop: StopSignal,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - The validated crawl configuration
    /// * `storage` - Backend receiving pages, resources, and the final report
    /// * `extractor` - Turns fetched bodies into page records
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(HarvestError)` - Invalid seed or HTTP client build failure
    pub fn new(
        config: Config,
        storage: Arc<dyn Storage>,
        extractor: Arc<dyn PageExtractor>,
    ) -> Result<Self, HarvestError> {
        let seed_task = CrawlTask::new(&config.crawler.seed_url, 0)?;
        let admission = AdmissionPolicy::new(&seed_task.key, config.crawler.max_depth)?;
        let seed = seed_task.url.clone();

        let mut frontier = Frontier::new();
        frontier.seed(seed_task);
        let visited = Arc::clone(frontier.visited());

        let client = FetchClient::new(&config)?;
        let retry = RetryPolicy::from_config(&config.crawler);
        let stop = StopSignal::new();

        let downloader = ResourceDownloader::new(
            client.clone(),
            retry.clone(),
            Arc::clone(&storage),
            Arc::clone(&visited),
            stop.clone(),
        );

        let context = WorkerContext {
            client,
            retry,
            admission,
            visited,
            extractor,
            storage,
            downloader,
            stop: stop.clone(),
            save_html: config.output.save_html,
            download_images: config.output.download_images,
        };

        Ok(Self {
            context: Arc::new(context),
            frontier,
            seed,
            workers: config.crawler.workers.max(1) as usize,
            stop,
        })
    }

    /// Returns a handle that stops the crawl when set
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Runs the crawl to completion or until stopped
    ///
    /// Generations are processed strictly in depth order: every task of
    /// generation g is joined before any task of generation g+1 starts.
    /// Task failures are counted in the report, never returned.
    pub async fn run(&mut self) -> CrawlReport {
        let started_at = Utc::now();
        let start_time = Instant::now();
        let permits = Arc::new(Semaphore::new(self.workers));

        let mut pages_visited = 0u64;
        let mut resources_downloaded = 0u64;
        let mut errors = 0u64;
        let mut interrupted = false;

        tracing::info!(
            "Starting crawl of {} (authority {}, max depth {}, {} workers)",
            self.seed,
            self.context.admission.authority(),
            self.context.admission.max_depth(),
            self.workers
        );

        while !self.frontier.is_empty() {
            if self.stop.is_stopped() {
                tracing::info!(
                    "Stop requested, {} queued URL(s) not visited",
                    self.frontier.len()
                );
                break;
            }

            let tasks = self.frontier.take_generation();
            let generation = self.frontier.generation();
            tracing::info!("Generation {}: {} URL(s)", generation, tasks.len());

            let mut reports: Vec<Option<TaskReport>> = (0..tasks.len()).map(|_| None).collect();
            let mut workers = JoinSet::new();

            for (index, task) in tasks.into_iter().enumerate() {
                let context = Arc::clone(&self.context);
                let permits = Arc::clone(&permits);
                workers.spawn(async move {
                    let _permit = match permits.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => return (index, TaskReport::interrupted()),
                    };
                    (index, process_task(&context, task).await)
                });
            }

            while let Some(joined) = workers.join_next().await {
                match joined {
                    Ok((index, report)) => reports[index] = Some(report),
                    Err(e) => {
                        tracing::error!("Worker failed: {}", e);
                        errors += 1;
                    }
                }
            }

            let mut children = Vec::new();
            for report in reports.into_iter().flatten() {
                if report.visited {
                    pages_visited += 1;
                }
                errors += report.errors;
                resources_downloaded += report.resources_downloaded;
                interrupted |= report.interrupted;
                children.extend(report.children);
            }

            tracing::info!(
                "Generation {} done: {} pages visited, {} new URL(s) queued, {} errors so far",
                generation,
                pages_visited,
                children.len(),
                errors
            );
            self.frontier.extend(children);
        }

        let status = if self.stop.is_stopped() && (interrupted || !self.frontier.is_empty()) {
            RunStatus::Stopped
        } else {
            RunStatus::Completed
        };

        let report = CrawlReport {
            status,
            seed_url: self.seed.to_string(),
            pages_visited,
            resources_downloaded,
            errors,
            generations: self.frontier.generation(),
            started_at,
            finished_at: Utc::now(),
            elapsed: start_time.elapsed(),
        };

        if let Err(e) = self.context.storage.record_run(&report) {
            tracing::warn!("Failed to record run: {}", e);
        }

        tracing::info!(
            "Crawl {}: {} pages visited, {} resources downloaded, {} errors in {:?}",
            report.status,
            report.pages_visited,
            report.resources_downloaded,
            report.errors,
            report.elapsed
        );

        report
    }
}

/// Processes a single task
///
/// This function:
/// 1. Fetches the page through the retry policy
/// 2. Stores the raw body if requested
/// 3. Extracts and stores the page record
/// 4. Downloads embedded resources
/// 5. Admits discovered links as the next generation's tasks
async fn process_task(context: &WorkerContext, task: CrawlTask) -> TaskReport {
    let mut report = TaskReport::default();

    if context.stop.is_stopped() {
        report.interrupted = true;
        return report;
    }

    let url = &task.url;
    let client = &context.client;
    let mut lifecycle = TaskLifecycle::new();
    let attempted = context
        .retry
        .attempt(url.as_str(), &context.stop, &mut lifecycle, move || {
            client.fetch(url)
        })
        .await;

    let fetched = match attempted.outcome {
        FetchOutcome::Success(fetched) => fetched,
        FetchOutcome::FatalFailure(failure) if failure.kind == FailureKind::Stopped => {
            report.interrupted = true;
            if attempted.attempts > 0 {
                report.errors += 1;
            }
            return report;
        }
        FetchOutcome::RetryableFailure(_) | FetchOutcome::FatalFailure(_) => {
            report.errors += 1;
            return report;
        }
    };

    report.visited = true;
    tracing::debug!(
        "Fetched {} ({} bytes, depth {}, {} attempt(s))",
        url,
        fetched.body.len(),
        task.depth,
        attempted.attempts
    );

    if context.save_html {
        if let Err(e) = context.storage.save_raw_page(url, &fetched.body) {
            tracing::warn!("Failed to save raw HTML for {}: {}", url, e);
            report.errors += 1;
        }
    }

    let page = match context
        .extractor
        .extract(&fetched.body, fetched.content_type.as_deref(), url)
    {
        Ok(page) => page,
        Err(e) => {
            tracing::warn!("Failed to extract {}: {}", url, e);
            report.errors += 1;
            return report;
        }
    };

    if let Err(e) = context.storage.save_page(&page) {
        tracing::warn!("Failed to save page {}: {}", url, e);
        report.errors += 1;
    }

    if context.download_images {
        for resource in &page.resources {
            match context.downloader.download(resource, url).await {
                DownloadOutcome::Saved { .. } => report.resources_downloaded += 1,
                DownloadOutcome::Skipped(SkipReason::Stopped) => report.interrupted = true,
                DownloadOutcome::Skipped(_) => {}
                DownloadOutcome::Failed { .. } => report.errors += 1,
            }
        }
    }

    for link in &page.links {
        match context.admission.admit(link, task.depth, &context.visited) {
            Admission::Admitted(child) => report.children.push(child),
            Admission::Rejected(reason) => {
                tracing::debug!("Not following {}: {:?}", link, reason);
            }
        }
    }

    report
}

/// Builds a coordinator and runs it to the end
///
/// # Arguments
///
/// * `config` - The validated crawl configuration
/// * `storage` - Backend receiving the crawl output
/// * `extractor` - Page extractor
///
/// # Returns
///
/// * `Ok(CrawlReport)` - The crawl ran (possibly with task failures)
/// * `Err(HarvestError)` - The crawl could not start
pub async fn run_crawl(
    config: Config,
    storage: Arc<dyn Storage>,
    extractor: Arc<dyn PageExtractor>,
) -> Result<CrawlReport, HarvestError> {
    let mut coordinator = Coordinator::new(config, storage, extractor)?;
    Ok(coordinator.run().await)
}
