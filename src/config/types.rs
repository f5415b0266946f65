use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Wiki-Harvest
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Absolute URL the crawl starts from; its authority scopes the crawl
    #[serde(rename = "seed-url")]
    pub seed_url: String,

    /// Maximum link depth from the seed (the seed itself is depth 0)
    #[serde(rename = "max-depth")]
    pub max_depth: u32,

    /// Number of pages fetched concurrently within one generation
    pub workers: u32,

    /// Base delay before every request, in milliseconds
    #[serde(rename = "delay-ms")]
    pub delay_ms: u64,

    /// Attempts per page or resource before it is abandoned
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Timeout for a single request attempt, in seconds
    #[serde(rename = "request-timeout-secs")]
    pub request_timeout_secs: u64,
}

impl CrawlerConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            seed_url: String::new(),
            max_depth: 3,
            workers: 3,
            delay_ms: 1000,
            max_retries: 3,
            request_timeout_secs: 30,
        }
    }
}

/// Header set attached to every request
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserAgentConfig {
    /// Value of the User-Agent header
    pub agent: String,

    /// Value of the Accept header
    pub accept: String,

    /// Value of the Accept-Language header
    #[serde(rename = "accept-language")]
    pub accept_language: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            agent: format!("WikiHarvest/{}", env!("CARGO_PKG_VERSION")),
            accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"
                .to_string(),
            accept_language: "en-US,en;q=0.5".to_string(),
        }
    }
}

/// Which storage collaborator receives pages and resources
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Markdown/JSON files and image files under the output directory
    #[default]
    Files,
    /// A single SQLite database under the output directory
    Sqlite,
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "files" => Ok(Self::Files),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(format!("unknown storage backend '{}'", other)),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Root directory for everything the crawl writes
    pub directory: String,

    /// Storage backend
    pub backend: StorageBackend,

    /// SQLite file name, relative to `directory`
    #[serde(rename = "database-file")]
    pub database_file: String,

    /// Download images referenced by fetched pages
    #[serde(rename = "download-images")]
    pub download_images: bool,

    /// Persist tables extracted from pages
    #[serde(rename = "save-tables")]
    pub save_tables: bool,

    /// Persist raw page bytes alongside the extracted record
    #[serde(rename = "save-html")]
    pub save_html: bool,
}

impl OutputConfig {
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.directory).join(&self.database_file)
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: "./wiki_data".to_string(),
            backend: StorageBackend::Files,
            database_file: "crawl.db".to_string(),
            download_images: true,
            save_tables: true,
            save_html: false,
        }
    }
}

/// Values supplied on the command line or through the environment
///
/// Every field left as `None` keeps the value from the config file (or the
/// built-in default).
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub seed_url: Option<String>,
    pub output_dir: Option<String>,
    pub max_depth: Option<u32>,
    pub workers: Option<u32>,
    pub delay_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub request_timeout_secs: Option<u64>,
    pub user_agent: Option<String>,
    pub download_images: Option<bool>,
    pub save_html: Option<bool>,
    pub save_tables: Option<bool>,
    pub backend: Option<StorageBackend>,
}

impl ConfigOverrides {
    /// Applies every present override onto `config`
    pub fn apply(&self, config: &mut Config) {
        if let Some(seed) = &self.seed_url {
            config.crawler.seed_url = seed.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output.directory = dir.clone();
        }
        if let Some(depth) = self.max_depth {
            config.crawler.max_depth = depth;
        }
        if let Some(workers) = self.workers {
            config.crawler.workers = workers;
        }
        if let Some(delay) = self.delay_ms {
            config.crawler.delay_ms = delay;
        }
        if let Some(retries) = self.max_retries {
            config.crawler.max_retries = retries;
        }
        if let Some(timeout) = self.request_timeout_secs {
            config.crawler.request_timeout_secs = timeout;
        }
        if let Some(agent) = &self.user_agent {
            config.user_agent.agent = agent.clone();
        }
        if let Some(images) = self.download_images {
            config.output.download_images = images;
        }
        if let Some(html) = self.save_html {
            config.output.save_html = html;
        }
        if let Some(tables) = self.save_tables {
            config.output.save_tables = tables;
        }
        if let Some(backend) = self.backend {
            config.output.backend = backend;
        }
    }
}
