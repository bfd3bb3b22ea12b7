//! Ergane main entry point
//!
//! This is the command-line interface for the Ergane web crawler.

use anyhow::{bail, Context};
use clap::Parser;
use ergane::config::{load_config_with_hash, Config};
use ergane::crawler::{Checkpoint, HtmlExtractor};
use ergane::output::{print_statistics, JsonlSink};
use ergane::{Crawler, PageItem};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Ergane: a polite, bounded web crawler
///
/// Ergane crawls outward from seed URLs while respecting robots.txt and
/// per-domain rate limits, and writes one JSON record per page.
#[derive(Parser, Debug)]
#[command(name = "ergane")]
#[command(version)]
#[command(about = "A polite, bounded web crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Seed URL (repeatable); replaces the seeds from the config file
    #[arg(long = "seed", value_name = "URL")]
    seeds: Vec<String>,

    /// Override the page budget
    #[arg(long)]
    max_pages: Option<usize>,

    /// Override the maximum link depth
    #[arg(long)]
    max_depth: Option<u32>,

    /// Override the number of workers
    #[arg(long)]
    concurrency: Option<usize>,

    /// Resume from the checkpoint at the configured checkpoint path
    #[arg(long)]
    resume: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long)]
    dry_run: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    fn apply_overrides(&self, config: &mut Config) {
        if !self.seeds.is_empty() {
            config.crawler.seeds = self.seeds.clone();
        }
        if let Some(max_pages) = self.max_pages {
            config.crawler.max_pages = max_pages;
        }
        if let Some(max_depth) = self.max_depth {
            config.crawler.max_depth = max_depth;
        }
        if let Some(concurrency) = self.concurrency {
            config.crawler.concurrency = concurrency;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::debug!("Configuration hash: {}", config_hash);
    cli.apply_overrides(&mut config);

    if cli.dry_run {
        ergane::config::validate(&config).context("invalid configuration")?;
        handle_dry_run(&config);
        return Ok(());
    }

    handle_crawl(config, config_hash, cli.resume).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// `RUST_LOG` takes precedence when set.
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if quiet {
            EnvFilter::new("error")
        } else {
            match verbose {
                0 => EnvFilter::new("ergane=info,warn"),
                1 => EnvFilter::new("ergane=debug,info"),
                _ => EnvFilter::new("ergane=trace,debug"),
            }
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== Ergane Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Max pages: {}", config.crawler.max_pages);
    println!("  Max depth: {}", config.crawler.max_depth);
    println!("  Concurrency: {}", config.crawler.concurrency);
    println!("  Rate limit: {} req/s per domain", config.crawler.rate_limit);
    for (domain, rate) in &config.crawler.domain_rate_limits {
        println!("    {}: {} req/s", domain, rate);
    }
    println!("  Same domain only: {}", config.crawler.same_domain);
    println!("  Respect robots.txt: {}", config.crawler.respect_robots_txt);

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nOutput: {}", config.output.path.display());
    if config.cache.enabled {
        println!("Response cache: {}", config.cache.path.display());
    }
    if let Some(path) = &config.checkpoint.path {
        println!(
            "Checkpoint: {} (every {} pages)",
            path.display(),
            config.checkpoint.interval
        );
    }

    println!("\nSeeds ({}):", config.crawler.seeds.len());
    for seed in &config.crawler.seeds {
        println!("  - {}", seed);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: String, resume: bool) -> anyhow::Result<()> {
    let checkpoint = if resume {
        let Some(path) = &config.checkpoint.path else {
            bail!("--resume needs [checkpoint] path in the configuration");
        };
        let checkpoint = Checkpoint::load_if_exists(path)
            .with_context(|| format!("failed to read checkpoint {}", path.display()))?;
        if checkpoint.is_none() {
            tracing::warn!("No checkpoint at {}; starting a fresh crawl", path.display());
        }
        checkpoint
    } else {
        None
    };

    let output_path = config.output.path.clone();
    let batch_size = config.output.batch_size;

    // Config is validated here, before any output file is touched
    let crawler = Crawler::new(config, HtmlExtractor::new())
        .context("failed to set up crawler")?
        .with_config_hash(config_hash);

    let sink = if checkpoint.is_some() {
        JsonlSink::<PageItem>::append(&output_path, batch_size)
    } else {
        JsonlSink::<PageItem>::create(&output_path, batch_size)
    }
    .with_context(|| format!("failed to prepare output {}", output_path.display()))?;

    let mut crawler = crawler.with_sink(Arc::new(sink));
    if let Some(checkpoint) = checkpoint {
        crawler = crawler.resume_from(checkpoint);
    }

    let shutdown = crawler.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, finishing in-flight pages");
            shutdown.shutdown();
        }
    });

    let mut handle = crawler.start().await.context("crawl failed to start")?;
    while handle.next_item().await.is_some() {}
    let report = handle.join().await?;

    println!();
    print_statistics(&report.stats);
    if report.completed {
        println!("\nOutput written to {}", output_path.display());
    } else {
        println!("\nCrawl interrupted; run again with --resume to continue");
    }

    Ok(())
}
