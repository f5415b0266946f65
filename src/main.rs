//! Wiki-Harvest main entry point
//!
//! This is the command-line interface for the Wiki-Harvest site fetcher.

use anyhow::{bail, Context};
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use wiki_harvest::config::{resolve_config, Config, ConfigOverrides, StorageBackend};
use wiki_harvest::crawler::Coordinator;
use wiki_harvest::extract::HtmlExtractor;
use wiki_harvest::output::{load_statistics, print_report, print_statistics};
use wiki_harvest::storage::{open_storage, SqliteStorage};

/// Wiki-Harvest: a scoped site fetcher
///
/// Wiki-Harvest crawls the pages reachable from a seed URL, one depth level
/// at a time, stays on the seed's host, and saves page text, tables, and
/// images to disk or to a SQLite database.
#[derive(Parser, Debug)]
#[command(name = "wiki-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A scoped site fetcher", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// URL the crawl starts from
    #[arg(long, env = "WIKI_URL")]
    seed_url: Option<String>,

    /// Directory receiving the crawl output
    #[arg(long, env = "OUTPUT_DIR")]
    output_dir: Option<String>,

    /// Maximum link depth from the seed
    #[arg(long, env = "MAX_DEPTH")]
    max_depth: Option<u32>,

    /// Pages fetched concurrently
    #[arg(long, env = "THREADS")]
    workers: Option<u32>,

    /// Base delay before every request, in milliseconds
    #[arg(long, env = "DELAY_MS")]
    delay_ms: Option<u64>,

    /// Attempts per page or image
    #[arg(long, env = "MAX_RETRIES")]
    max_retries: Option<u32>,

    /// Timeout of a single request, in seconds
    #[arg(long = "timeout", env = "REQUEST_TIMEOUT")]
    request_timeout: Option<u64>,

    /// User-Agent header value
    #[arg(long, env = "USER_AGENT")]
    user_agent: Option<String>,

    /// Download images referenced by pages
    #[arg(long, env = "DOWNLOAD_IMAGES", action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    download_images: Option<bool>,

    /// Save the raw HTML of every page
    #[arg(long, env = "SAVE_HTML", action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    save_html: Option<bool>,

    /// Save tables extracted from pages
    #[arg(long, env = "SAVE_TABLES", action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    save_tables: Option<bool>,

    /// Storage backend: files or sqlite
    #[arg(long)]
    backend: Option<StorageBackend>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the SQLite database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            seed_url: self.seed_url.clone(),
            output_dir: self.output_dir.clone(),
            max_depth: self.max_depth,
            workers: self.workers,
            delay_ms: self.delay_ms,
            max_retries: self.max_retries,
            request_timeout_secs: self.request_timeout,
            user_agent: self.user_agent.clone(),
            download_images: self.download_images,
            save_html: self.save_html,
            save_tables: self.save_tables,
            backend: self.backend,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let overrides = cli.overrides();

    if cli.stats {
        // Statistics only need the output location, not a seed
        let config = match &cli.config {
            Some(path) => resolve_config(Some(path.as_path()), &overrides)?.0,
            None => {
                let mut config = Config::default();
                overrides.apply(&mut config);
                config
            }
        };
        return handle_stats(&config);
    }

    let (config, config_hash) = resolve_config(cli.config.as_deref(), &overrides)
        .context("Failed to load configuration")?;
    match &config_hash {
        Some(hash) => tracing::info!("Configuration loaded successfully (hash: {})", hash),
        None => tracing::info!("No configuration file given, using flags and environment"),
    }

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    handle_crawl(config, config_hash).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("wiki_harvest=info,warn"),
            1 => EnvFilter::new("wiki_harvest=debug,info"),
            2 => EnvFilter::new("wiki_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the resolved configuration
fn handle_dry_run(config: &Config) {
    println!("=== Wiki-Harvest Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Seed URL: {}", config.crawler.seed_url);
    println!("  Max depth: {}", config.crawler.max_depth);
    println!("  Workers: {}", config.crawler.workers);
    println!("  Base delay: {}ms", config.crawler.delay_ms);
    println!("  Max retries: {}", config.crawler.max_retries);
    println!(
        "  Request timeout: {}s",
        config.crawler.request_timeout_secs
    );

    println!("\nUser Agent:");
    println!("  Agent: {}", config.user_agent.agent);
    println!("  Accept: {}", config.user_agent.accept);
    println!("  Accept-Language: {}", config.user_agent.accept_language);

    println!("\nOutput:");
    println!("  Directory: {}", config.output.directory);
    println!("  Backend: {:?}", config.output.backend);
    if config.output.backend == StorageBackend::Sqlite {
        println!("  Database: {}", config.output.database_path().display());
    }
    println!("  Download images: {}", config.output.download_images);
    println!("  Save tables: {}", config.output.save_tables);
    println!("  Save HTML: {}", config.output.save_html);

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let path = config.output.database_path();
    println!("Database: {}\n", path.display());

    if !path.is_file() {
        bail!("No database at {}", path.display());
    }

    // Open the database
    let storage = SqliteStorage::new(&path, config.output.save_tables)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    // Load statistics
    let stats = load_statistics(&storage)?;

    // Print statistics
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: Option<String>) -> anyhow::Result<()> {
    let storage = open_storage(
        &config.output,
        &config.crawler.seed_url,
        config_hash.as_deref(),
    )
    .with_context(|| format!("Failed to open storage in {}", config.output.directory))?;

    let mut coordinator = Coordinator::new(config, storage, Arc::new(HtmlExtractor::new()))
        .context("Failed to start crawl")?;

    let stop = coordinator.stop_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight requests");
            stop.stop();
        }
    });

    let report = coordinator.run().await;
    print_report(&report);
    if !report.is_completed() {
        tracing::warn!("Crawl was stopped before the frontier drained");
    }

    Ok(())
}
