//! Availability crawler main entry point
//!
//! This is the command-line interface for the availability crawler.

use anyhow::Context;
use availability_crawler::config::{load_config_with_hash, load_manifest_urls, Config};
use availability_crawler::crawler::Coordinator;
use availability_crawler::output::{load_statistics, print_statistics};
use availability_crawler::storage::SqliteStorage;
use chrono::Utc;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Availability Crawler: a polite manifest crawler
///
/// Polls the configured root manifests, fetches the Location, Schedule and
/// Slot files they list, and records every fetch in an append-only ledger.
/// Caching headers, polling hints and a per-URL rate limit are honored.
#[derive(Parser, Debug)]
#[command(name = "availability-crawler")]
#[command(version)]
#[command(about = "A polite manifest crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Register every manifest URL listed in this file (one per line)
    #[arg(long, value_name = "PATH")]
    manifest_file: Option<PathBuf>,

    /// Never serve from the cache and send no validators
    #[arg(long)]
    skip_cache: bool,

    /// Fetch even inside the per-URL rate-limit window
    #[arg(long)]
    ignore_rate_limiting: bool,

    /// Show which manifests are due without fetching anything
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config).with_context(|| {
        format!(
            "Failed to load configuration from {}",
            cli.config.display()
        )
    })?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    config.fetch.skip_cache |= cli.skip_cache;
    config.fetch.ignore_rate_limiting |= cli.ignore_rate_limiting;

    if cli.stats {
        return handle_stats(&config);
    }

    let coordinator = Coordinator::new(config.clone())
        .with_context(|| format!("Failed to open database {}", config.output.database_path))?
        .with_config_hash(&config_hash);

    if let Some(path) = &cli.manifest_file {
        register_manifest_file(&coordinator, path)?;
    }

    if cli.dry_run {
        handle_dry_run(&config, &coordinator)
    } else {
        handle_crawl(&coordinator).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("availability_crawler=info,warn"),
            1 => EnvFilter::new("availability_crawler=debug,info"),
            2 => EnvFilter::new("availability_crawler=trace,debug"),
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

fn register_manifest_file(coordinator: &Coordinator, path: &Path) -> anyhow::Result<()> {
    let urls = load_manifest_urls(path)
        .with_context(|| format!("Failed to read manifest list {}", path.display()))?;
    let registered = coordinator.register_manifests(&urls)?;
    tracing::info!(
        "Registered {} manifests from {}",
        registered.len(),
        path.display()
    );
    Ok(())
}

/// Handles the --dry-run mode: shows the polling plan without fetching
fn handle_dry_run(config: &Config, coordinator: &Coordinator) -> anyhow::Result<()> {
    println!("=== Availability Crawler Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Rate-limit window: {}s", config.crawler.rate_limit_window);
    println!("  Request timeout: {}s", config.crawler.request_timeout);
    println!("  Default expiration: {}s", config.crawler.default_expiration);
    println!(
        "  Default polling interval: {}s",
        config.crawler.default_polling_interval
    );
    println!(
        "  Max concurrent manifests: {}",
        config.crawler.max_concurrent_manifests
    );
    println!("  Fetch options: {:?}", config.fetch);

    println!("\nUser Agent: {}", config.user_agent.header_value());
    println!("Database: {}", config.output.database_path);

    coordinator.register_configured_manifests()?;
    let now = Utc::now();
    let plan = coordinator.plan(now)?;

    println!("\nKnown Manifests ({}):", plan.len());
    for entry in &plan {
        let when = match (entry.due, entry.next_fetch_at) {
            (_, None) => "due (never fetched)".to_string(),
            (true, Some(_)) => "due".to_string(),
            (false, Some(at)) => format!("not due until {}", at.to_rfc3339()),
        };
        println!("  - {} [{}]", entry.manifest.url, when);
    }

    let due = plan.iter().filter(|entry| entry.due).count();
    println!("\n✓ Configuration is valid");
    println!("✓ Would crawl {} of {} manifests", due, plan.len());

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))
        .with_context(|| format!("Failed to open database {}", config.output.database_path))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(coordinator: &Coordinator) -> anyhow::Result<()> {
    match coordinator.run().await {
        Ok(summary) => {
            println!("{}", summary);
            tracing::info!("Crawl completed successfully");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e).context("Crawl failed")
        }
    }
}
