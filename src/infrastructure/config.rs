//! Configuration infrastructure
//!
//! One `AppConfig` value is built at process start and handed to every
//! component by reference. It is stored as pretty-printed JSON in the user
//! config directory and can be overridden per key from the environment,
//! e.g. `DROM_CRAWLER__FETCH__MAX_RETRIES=5`.

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

use crate::infrastructure::parsing::config::SelectorConfig;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "DROM_CRAWLER";

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub fetch: FetchConfig,
    pub crawl: CrawlConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub selectors: SelectorConfig,
}

/// Politeness, retry and transport settings for page fetching
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Site root, e.g. `https://www.drom.ru`
    pub base_url: String,

    /// Lower bound of the random delay applied before every request
    pub min_delay_ms: u64,

    /// Upper bound of the random delay applied before every request
    pub max_delay_ms: u64,

    /// Per-request timeout in seconds
    pub request_timeout_seconds: u64,

    /// Retries after the first attempt for transient failures
    pub max_retries: u32,

    /// Backoff before the first retry
    pub backoff_base_ms: u64,

    /// Growth factor between consecutive retries
    pub backoff_multiplier: f64,

    /// Upper bound for any single backoff delay
    pub backoff_ceiling_ms: u64,

    /// Pause applied to all workers after a rate-limit response
    pub rate_limit_cooldown_ms: u64,

    /// Global request quota shared by all workers
    pub requests_per_minute: u32,

    /// Rotated `User-Agent` pool
    pub user_agents: Vec<String>,

    pub accept: String,
    pub accept_language: String,
}

impl FetchConfig {
    pub const fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    pub const fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub const fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_millis(self.rate_limit_cooldown_ms)
    }
}

/// Crawl pipeline limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Parallel fetch-and-extract workers
    pub max_workers: usize,

    /// Capacity of the bounded work queue
    pub queue_capacity: usize,

    /// Page cap per model for long-form reviews
    pub max_long_pages: u32,

    /// Page cap per model for short reviews
    pub max_short_pages: u32,

    /// Stop paginating a model once this many reviews were extracted
    pub max_reviews_per_model: u64,

    /// Times a worker re-requests a rate-limited page after the shared pause
    pub max_rate_limit_rounds: u32,

    /// Minimum body length (characters) of a complete review
    pub completeness_threshold: usize,

    /// Fetch each long review's own page for reader comments when the
    /// listing block carries none
    pub fetch_comments: bool,

    /// Last successful catalog snapshot
    pub catalog_cache_path: PathBuf,
}

/// Storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection url, `sqlite:<path>`
    pub url: String,
    pub max_connections: u32,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted file logs
    pub json_format: bool,

    /// Enable console output
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Directory for log files; defaults to `logs/` next to the executable
    pub log_dir: Option<PathBuf>,

    /// Active log file name
    pub log_file_name: String,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Module-specific log level filters (e.g., "sqlx": "warn")
    pub module_filters: HashMap<String, String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: drom::BASE_URL.to_string(),
            min_delay_ms: defaults::MIN_DELAY_MS,
            max_delay_ms: defaults::MAX_DELAY_MS,
            request_timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            max_retries: defaults::MAX_RETRIES,
            backoff_base_ms: defaults::BACKOFF_BASE_MS,
            backoff_multiplier: defaults::BACKOFF_MULTIPLIER,
            backoff_ceiling_ms: defaults::BACKOFF_CEILING_MS,
            rate_limit_cooldown_ms: defaults::RATE_LIMIT_COOLDOWN_MS,
            requests_per_minute: defaults::REQUESTS_PER_MINUTE,
            user_agents: defaults::USER_AGENTS.iter().map(ToString::to_string).collect(),
            accept: defaults::ACCEPT.to_string(),
            accept_language: defaults::ACCEPT_LANGUAGE.to_string(),
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_workers: defaults::MAX_WORKERS,
            queue_capacity: defaults::QUEUE_CAPACITY,
            max_long_pages: defaults::MAX_LONG_PAGES,
            max_short_pages: defaults::MAX_SHORT_PAGES,
            max_reviews_per_model: defaults::MAX_REVIEWS_PER_MODEL,
            max_rate_limit_rounds: defaults::MAX_RATE_LIMIT_ROUNDS,
            completeness_threshold: defaults::COMPLETENESS_THRESHOLD,
            fetch_comments: defaults::FETCH_COMMENTS,
            catalog_cache_path: app_data_path("cache").join(defaults::CATALOG_CACHE_FILE),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let db_path = app_data_path("database").join(defaults::DATABASE_FILE);
        Self {
            url: format!("sqlite:{}", db_path.display()),
            max_connections: defaults::DB_MAX_CONNECTIONS,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: false,
            console_output: true,
            file_output: true,
            log_dir: None,
            log_file_name: defaults::LOG_FILE_NAME.to_string(),
            max_files: defaults::LOG_MAX_FILES,
            module_filters: {
                let mut filters = HashMap::new();
                filters.insert("sqlx".to_string(), "warn".to_string());
                filters.insert("reqwest".to_string(), "info".to_string());
                filters.insert("hyper".to_string(), "warn".to_string());
                filters
            },
        }
    }
}

impl AppConfig {
    /// Reject settings that would make the crawler misbehave
    pub fn validate(&self) -> Result<()> {
        let fetch = &self.fetch;
        if fetch.min_delay_ms > fetch.max_delay_ms {
            bail!(
                "fetch.min_delay_ms ({}) is greater than fetch.max_delay_ms ({})",
                fetch.min_delay_ms,
                fetch.max_delay_ms
            );
        }
        if fetch.user_agents.is_empty() {
            bail!("fetch.user_agents must contain at least one entry");
        }
        if fetch.backoff_multiplier < 1.0 {
            bail!("fetch.backoff_multiplier must be >= 1.0, got {}", fetch.backoff_multiplier);
        }
        if fetch.backoff_base_ms > fetch.backoff_ceiling_ms {
            bail!("fetch.backoff_base_ms must not exceed fetch.backoff_ceiling_ms");
        }
        if fetch.requests_per_minute == 0 {
            bail!("fetch.requests_per_minute must be positive");
        }
        if self.crawl.max_workers == 0 {
            bail!("crawl.max_workers must be positive");
        }
        if self.crawl.queue_capacity == 0 {
            bail!("crawl.queue_capacity must be positive");
        }
        if self.database.max_connections == 0 {
            bail!("database.max_connections must be positive");
        }
        Ok(())
    }

    /// Layer environment variables over this configuration
    pub fn with_environment(self, environment: config::Environment) -> Result<Self> {
        let layered = config::Config::builder()
            .add_source(config::Config::try_from(&self).context("Failed to serialize configuration")?)
            .add_source(environment)
            .build()
            .context("Failed to apply environment overrides")?;

        layered
            .try_deserialize::<Self>()
            .context("Environment overrides produced an invalid configuration")
    }
}

/// Environment source used for overrides
pub fn environment_source() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}

fn app_data_path(sub_dir: &str) -> PathBuf {
    ConfigManager::get_app_data_dir()
        .unwrap_or_else(|_| PathBuf::from("data"))
        .join(sub_dir)
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join(defaults::APP_DIR_NAME);

        Ok(config_dir)
    }

    /// Get application data directory
    pub fn get_app_data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .context("Failed to get user data directory")?
            .join(defaults::APP_DIR_NAME);

        Ok(data_dir)
    }

    /// Manager for the default config file location
    pub fn new() -> Result<Self> {
        let config_path = Self::get_config_dir()?.join(defaults::CONFIG_FILE_NAME);
        Ok(Self { config_path })
    }

    /// Manager for an explicit config file
    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self { config_path: config_path.into() }
    }

    /// Load the file, apply environment overrides and validate
    pub async fn load(&self) -> Result<AppConfig> {
        let config = self.load_config().await?.with_environment(environment_source())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file, creating default if it doesn't exist
    pub async fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!("Configuration file not found, creating default: {:?}", self.config_path);
            let default_config = AppConfig::default();
            self.save_config(&default_config).await?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .context("Failed to read configuration file")?;

        match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => {
                info!("Loaded configuration from: {:?}", self.config_path);
                Ok(config)
            }
            Err(parse_error) => {
                warn!("⚠️  Configuration file could not be parsed: {}", parse_error);
                self.backup_corrupted().await;

                let default_config = AppConfig::default();
                self.save_config(&default_config)
                    .await
                    .context("Failed to save default configuration")?;

                info!("✅ Reset to default configuration");
                Ok(default_config)
            }
        }
    }

    async fn backup_corrupted(&self) {
        let backup_path = self.config_path.with_extension("json.corrupted");
        match fs::copy(&self.config_path, &backup_path).await {
            Ok(_) => info!("Backed up corrupted config to: {:?}", backup_path),
            Err(e) => warn!("Failed to create backup of corrupted config: {}", e),
        }
    }

    /// Save configuration to file
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;

        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;

        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

/// drom.ru URL layout
pub mod drom {
    /// Site root
    pub const BASE_URL: &str = "https://www.drom.ru";

    /// Path of the reviews catalog
    pub const REVIEWS_PATH: &str = "/reviews/";

    /// Path segment of the short reviews listing
    pub const SHORT_REVIEWS_SEGMENT: &str = "5kopeek";

    pub fn reviews_root_url(base_url: &str) -> String {
        format!("{}{}", base_url.trim_end_matches('/'), REVIEWS_PATH)
    }

    pub fn brand_url(base_url: &str, brand: &str) -> String {
        format!("{}{}/", reviews_root_url(base_url), brand)
    }

    pub fn model_url(base_url: &str, brand: &str, model: &str) -> String {
        format!("{}{}/", brand_url(base_url, brand), model)
    }

    /// Long-form listing page. Page 1 has no query string.
    pub fn long_reviews_page_url(base_url: &str, brand: &str, model: &str, page: u32) -> String {
        paged(model_url(base_url, brand, model), page)
    }

    /// Short reviews listing page. Page 1 has no query string.
    pub fn short_reviews_page_url(base_url: &str, brand: &str, model: &str, page: u32) -> String {
        paged(
            format!("{}{}/", model_url(base_url, brand, model), SHORT_REVIEWS_SEGMENT),
            page,
        )
    }

    fn paged(url: String, page: u32) -> String {
        if page <= 1 { url } else { format!("{url}?p={page}") }
    }

    /// Resolve a site-relative link against the base url
    pub fn resolve_url(base_url: &str, href: &str) -> String {
        if href.starts_with("http://") || href.starts_with("https://") {
            href.to_string()
        } else if href.starts_with("//") {
            format!("https:{href}")
        } else if href.starts_with('/') {
            format!("{}{}", base_url.trim_end_matches('/'), href)
        } else {
            format!("{}/{}", base_url.trim_end_matches('/'), href)
        }
    }
}

/// Default configuration values
pub mod defaults {
    pub const APP_DIR_NAME: &str = "drom-reviews-crawler";
    pub const CONFIG_FILE_NAME: &str = "crawler_config.json";
    pub const DATABASE_FILE: &str = "drom_reviews.db";
    pub const CATALOG_CACHE_FILE: &str = "catalog_cache.json";

    /// Politeness window before each request
    pub const MIN_DELAY_MS: u64 = 5_000;
    pub const MAX_DELAY_MS: u64 = 15_000;

    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;
    pub const MAX_RETRIES: u32 = 3;

    /// Backoff grows from the error delay up to the ceiling
    pub const BACKOFF_BASE_MS: u64 = 30_000;
    pub const BACKOFF_MULTIPLIER: f64 = 2.0;
    pub const BACKOFF_CEILING_MS: u64 = 300_000;

    /// Shared pause after HTTP 429
    pub const RATE_LIMIT_COOLDOWN_MS: u64 = 300_000;
    pub const REQUESTS_PER_MINUTE: u32 = 20;

    pub const MAX_WORKERS: usize = 4;
    pub const QUEUE_CAPACITY: usize = 64;
    pub const MAX_LONG_PAGES: u32 = 100;
    pub const MAX_SHORT_PAGES: u32 = 50;
    pub const MAX_REVIEWS_PER_MODEL: u64 = 1000;
    pub const MAX_RATE_LIMIT_ROUNDS: u32 = 3;

    /// Reviews with fewer body characters are stored as incomplete
    pub const COMPLETENESS_THRESHOLD: usize = 100;

    pub const FETCH_COMMENTS: bool = false;

    pub const DB_MAX_CONNECTIONS: u32 = 10;

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_FILE_NAME: &str = "drom-reviews-crawler.log";
    pub const LOG_MAX_FILES: u32 = 10;

    pub const USER_AGENTS: [&str; 4] = [
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    ];

    pub const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
    pub const ACCEPT_LANGUAGE: &str = "ru-RU,ru;q=0.8,en-US;q=0.5,en;q=0.3";
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fetch.user_agents.len(), 4);
        assert_eq!(config.crawl.completeness_threshold, 100);
        assert!(config.database.url.starts_with("sqlite:"));
    }

    #[test]
    fn test_validate_rejects_inverted_delay_window() {
        let mut config = AppConfig::default();
        config.fetch.min_delay_ms = 10_000;
        config.fetch.max_delay_ms = 1_000;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.crawl.max_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_environment_overrides_single_keys() -> Result<()> {
        let mut vars = HashMap::new();
        vars.insert("DROM_CRAWLER__FETCH__MAX_RETRIES".to_string(), "7".to_string());
        vars.insert("DROM_CRAWLER__CRAWL__MAX_WORKERS".to_string(), "2".to_string());

        let config = AppConfig::default().with_environment(environment_source().source(Some(vars)))?;

        assert_eq!(config.fetch.max_retries, 7);
        assert_eq!(config.crawl.max_workers, 2);
        assert_eq!(config.fetch.min_delay_ms, defaults::MIN_DELAY_MS);
        Ok(())
    }

    #[test]
    fn test_drom_urls() {
        let base = drom::BASE_URL;
        assert_eq!(drom::reviews_root_url(base), "https://www.drom.ru/reviews/");
        assert_eq!(drom::brand_url(base, "toyota"), "https://www.drom.ru/reviews/toyota/");
        assert_eq!(
            drom::long_reviews_page_url(base, "toyota", "camry", 1),
            "https://www.drom.ru/reviews/toyota/camry/"
        );
        assert_eq!(
            drom::long_reviews_page_url(base, "toyota", "camry", 3),
            "https://www.drom.ru/reviews/toyota/camry/?p=3"
        );
        assert_eq!(
            drom::short_reviews_page_url(base, "toyota", "camry", 2),
            "https://www.drom.ru/reviews/toyota/camry/5kopeek/?p=2"
        );
        assert_eq!(drom::resolve_url(base, "/reviews/lada/"), "https://www.drom.ru/reviews/lada/");
        assert_eq!(drom::resolve_url(base, "//s.auto.drom.ru/logo.png"), "https://s.auto.drom.ru/logo.png");
    }

    #[tokio::test]
    async fn test_config_manager_creates_and_reloads_file() -> Result<()> {
        let temp_dir = tempdir()?;
        let manager = ConfigManager::with_path(temp_dir.path().join("nested").join("config.json"));

        let created = manager.load_config().await?;
        assert!(manager.config_path().exists());

        let mut changed = created.clone();
        changed.crawl.max_workers = 9;
        manager.save_config(&changed).await?;

        let reloaded = manager.load_config().await?;
        assert_eq!(reloaded.crawl.max_workers, 9);
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupted_config_is_backed_up_and_reset() -> Result<()> {
        let temp_dir = tempdir()?;
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, "{ not json")?;

        let manager = ConfigManager::with_path(&path);
        let config = manager.load_config().await?;

        assert_eq!(config.crawl.max_workers, defaults::MAX_WORKERS);
        assert!(path.with_extension("json.corrupted").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_partial_file_keeps_defaults_for_missing_sections() -> Result<()> {
        let temp_dir = tempdir()?;
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, r#"{ "crawl": { "max_workers": 1 } }"#)?;

        let config = ConfigManager::with_path(&path).load_config().await?;
        assert_eq!(config.crawl.max_workers, 1);
        assert_eq!(config.crawl.queue_capacity, defaults::QUEUE_CAPACITY);
        assert_eq!(config.fetch.max_retries, defaults::MAX_RETRIES);
        Ok(())
    }
}
