//! Command-line entry point. Parses arguments, loads configuration and
//! hands off to the orchestrator.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use drom_reviews_crawler::crawling::{CatalogOutcome, CrawlLimits, CrawlOrchestrator};
use drom_reviews_crawler::domain::{CrawlScope, CrawlSession, CrawlStatistics, ReviewVariant, SessionStatus};
use drom_reviews_crawler::infrastructure::logging::{init_logging_with_config, log_system_info};
use drom_reviews_crawler::infrastructure::{AppConfig, ConfigManager, DatabaseConnection, ReqwestTransport, ReviewRepository};

#[derive(Parser)]
#[command(name = "drom-reviews-crawler")]
#[command(about = "Crawl drom.ru car owner reviews into sqlite")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured worker count
    #[arg(short, long)]
    workers: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover brands and models
    Init,

    /// Crawl reviews of one brand, or of one model
    Parse {
        brand: String,
        model: Option<String>,

        #[arg(short, long, value_enum, default_value_t = VariantArg::Both)]
        variant: VariantArg,

        /// Page cap per model, below the configured one
        #[arg(long)]
        max_pages: Option<u32>,
    },

    /// Show catalog, review and session statistics
    Stats {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Catalog discovery followed by a crawl of everything
    Full {
        #[arg(short, long, value_enum, default_value_t = VariantArg::Both)]
        variant: VariantArg,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum VariantArg {
    Long,
    Short,
    Both,
}

impl VariantArg {
    fn variants(self) -> Vec<ReviewVariant> {
        match self {
            Self::Long => vec![ReviewVariant::Long],
            Self::Short => vec![ReviewVariant::Short],
            Self::Both => ReviewVariant::ALL.to_vec(),
        }
    }
}

async fn load_config(cli: &Cli) -> Result<AppConfig> {
    let manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new()?,
    };
    let mut config = manager.load().await?;
    if let Some(workers) = cli.workers {
        config.crawl.max_workers = workers;
        config.validate()?;
    }
    Ok(config)
}

fn print_session(session: &CrawlSession) {
    println!(
        "{} [{}] {}: {} pages, {} found, {} saved, {} errors",
        session.kind, session.scope, session.status, session.pages_processed, session.records_found,
        session.records_saved, session.errors
    );
    if let Some(message) = &session.error_message {
        println!("  last error: {message}");
    }
}

fn print_catalog(outcome: &CatalogOutcome) {
    print_session(&outcome.session);
    if let Some(diff) = &outcome.diff {
        println!(
            "  brands: +{} -{}, models: +{} -{}",
            diff.added_brands.len(),
            diff.removed_brands.len(),
            diff.added_models.len(),
            diff.removed_models.len()
        );
    }
}

fn print_statistics(stats: &CrawlStatistics) {
    println!("Brands:  {}", stats.total_brands);
    println!("Models:  {}", stats.total_models);
    println!(
        "Reviews: {} ({} long, {} short, {} complete)",
        stats.total_reviews, stats.long_reviews, stats.short_reviews, stats.complete_reviews
    );
    println!("Comments: {}", stats.total_comments);
    if !stats.top_brands.is_empty() {
        println!("Top brands:");
        for (slug, count) in &stats.top_brands {
            println!("  {slug:<20} {count}");
        }
    }
    if !stats.recent_sessions.is_empty() {
        println!("Recent sessions:");
        for session in &stats.recent_sessions {
            println!(
                "  {} {} [{}] {}: {} found, {} saved, {} errors",
                session.session_id, session.kind, session.scope, session.status, session.records_found,
                session.records_saved, session.errors
            );
        }
    }
}

async fn crawl_reviews(
    orchestrator: &CrawlOrchestrator,
    scope: &CrawlScope,
    variants: &[ReviewVariant],
    max_pages: Option<u32>,
) -> Result<bool> {
    let mut all_completed = true;
    for &variant in variants {
        if orchestrator.cancellation_token().is_cancelled() {
            break;
        }
        let mut limits = CrawlLimits::from_config(&orchestrator.config().crawl, variant);
        if let Some(cap) = max_pages {
            limits.max_pages = limits.max_pages.min(cap);
        }
        let session = orchestrator.run_review_crawl(scope, variant, limits).await?;
        print_session(&session);
        all_completed &= session.status == SessionStatus::Completed;
    }
    Ok(all_completed)
}

async fn run(cli: Cli) -> Result<bool> {
    let config = Arc::new(load_config(&cli).await?);
    init_logging_with_config(&config.logging)?;
    log_system_info();

    let database = DatabaseConnection::from_config(&config.database).await?;
    database.migrate().await?;
    let repository = ReviewRepository::new(database.pool().clone());

    if let Commands::Stats { json } = cli.command {
        let stats = repository.statistics().await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&stats).context("Failed to render statistics")?);
        } else {
            print_statistics(&stats);
        }
        return Ok(true);
    }

    let transport = Arc::new(ReqwestTransport::new(&config.fetch)?);
    let cancel = CancellationToken::new();
    let orchestrator = CrawlOrchestrator::new(config.clone(), transport, repository, cancel.clone()).await?;

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Ctrl-C received, finishing in-flight work");
            cancel.cancel();
        }
    });

    let completed = match cli.command {
        Commands::Init => {
            let outcome = orchestrator.run_catalog_discovery().await?;
            print_catalog(&outcome);
            outcome.session.status == SessionStatus::Completed
        }
        Commands::Parse { brand, model, variant, max_pages } => {
            let scope = match model {
                Some(model) => CrawlScope::model(brand, model),
                None => CrawlScope::brand(brand),
            };
            crawl_reviews(&orchestrator, &scope, &variant.variants(), max_pages).await?
        }
        Commands::Full { variant } => {
            let outcome = orchestrator.run_catalog_discovery().await?;
            print_catalog(&outcome);
            if outcome.session.status != SessionStatus::Completed {
                bail!("Catalog discovery failed, not crawling reviews");
            }
            crawl_reviews(&orchestrator, &CrawlScope::all(), &variant.variants(), None).await?
        }
        Commands::Stats { .. } => true,
    };

    info!("👋 Done");
    Ok(completed)
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    match run(Cli::parse()).await {
        Ok(true) => std::process::ExitCode::SUCCESS,
        Ok(false) => std::process::ExitCode::from(2),
        Err(e) => {
            error!("❌ {:#}", e);
            eprintln!("Error: {e:#}");
            std::process::ExitCode::FAILURE
        }
    }
}
