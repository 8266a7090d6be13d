//! Infrastructure layer for configuration, storage, fetching and parsing
//!
//! Everything that touches the network, the filesystem or sqlite lives
//! here. The crawling layer composes these pieces; the domain layer never
//! sees them.

pub mod config; // Configuration values, file loading and env overrides
pub mod database_connection;
pub mod http_transport;
pub mod logging;
pub mod page_fetcher; // Polite fetch with retry/backoff
pub mod parsing; // HTML extraction for catalog and review pages
pub mod rate_limit_gate;
pub mod retry_policy;
pub mod review_repository; // Sole writer of durable state

// Re-export commonly used items
pub use config::{AppConfig, ConfigManager, CrawlConfig, DatabaseConfig, FetchConfig, LoggingConfig, drom};
pub use database_connection::DatabaseConnection;
pub use http_transport::{FetchFailure, HttpTransport, RawResponse, ReqwestTransport};
pub use logging::{get_log_directory, init_logging, init_logging_with_config};
pub use page_fetcher::{PageFetcher, PageResult};
pub use parsing::{CatalogParser, ExtractContext, PageExtraction, ParsingError, ParsingResult, ReviewExtractor, SelectorConfig};
pub use rate_limit_gate::RateLimitGate;
pub use retry_policy::{BackoffSchedule, RetryPolicy, RetryState};
pub use review_repository::ReviewRepository;
