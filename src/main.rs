//! Sumi-Tide main entry point
//!
//! This is the command-line interface for the Sumi-Tide crawl scheduler.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use sumi_tide::config::{load_config_with_hash, Config};
use sumi_tide::job::{run_phase, JobContext, Phase, PhaseOutcome};
use sumi_tide::storage::open_store;
use tracing_subscriber::EnvFilter;

/// Sumi-Tide: the scheduling core of a polite crawler
///
/// Sumi-Tide keeps one record per known URL, generates fetch lists of the
/// URLs that are due, fetches them under per-host politeness limits and
/// folds the outcomes back into the record db.
#[derive(Parser, Debug)]
#[command(name = "sumi-tide")]
#[command(version = "1.0.0")]
#[command(about = "Scheduling and reconciliation core of a polite crawler", long_about = None)]
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

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Merge a seed list into the record db
    Inject {
        /// Seed file: one URL per line, optional tab-separated key=value pairs
        seeds: PathBuf,
    },

    /// Select due records into new segments
    Generate,

    /// Fetch a segment (default: the newest generated one)
    Fetch { segment: Option<String> },

    /// Update the record db from a fetched segment (default: the newest fetched one)
    Update { segment: Option<String> },

    /// Show statistics from the database and exit
    Stats,

    /// Validate the configuration and show it without touching the database
    DryRun,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let phase = match cli.command {
        Command::DryRun => {
            handle_dry_run(&config);
            return Ok(());
        }
        Command::Stats => return handle_stats(&config),
        Command::Inject { seeds } => Phase::Inject { seeds },
        Command::Generate => Phase::Generate,
        Command::Fetch { segment } => Phase::Fetch { segment },
        Command::Update { segment } => Phase::Update { segment },
    };

    handle_phase(config, config_hash, phase).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_tide=info,warn"),
            1 => EnvFilter::new("sumi_tide=debug,info"),
            2 => EnvFilter::new("sumi_tide=trace,debug"),
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

/// Handles the dry-run command: shows the validated configuration
fn handle_dry_run(config: &Config) {
    println!("=== Sumi-Tide Dry Run ===\n");

    println!("Fetcher:");
    println!("  Threads: {}", config.fetcher.threads);
    println!("  Threads per queue: {}", config.fetcher.threads_per_queue);
    println!("  Server delay: {}s", config.fetcher.server_delay);
    println!("  Server min delay: {}s", config.fetcher.server_min_delay);
    println!("  Max crawl delay: {}s", config.fetcher.max_crawl_delay);
    println!("  Max redirects: {}", config.fetcher.max_redirects);
    println!("  Queue mode: {:?}", config.fetcher.queue_mode);
    println!("  Buffer capacity: {}", config.fetcher.buffer_capacity());

    println!("\nSchedule:");
    println!("  Class: {:?}", config.schedule.class);
    println!("  Default interval: {}s", config.schedule.default_interval_secs);
    println!("  Max interval: {}s", config.schedule.max_interval_secs);
    println!("  Retry max: {}", config.schedule.retry_max);

    println!("\nGenerate:");
    match config.generate.top_n {
        Some(top_n) => println!("  Top N: {}", top_n),
        None => println!("  Top N: unlimited"),
    }
    println!(
        "  Max count: {} per {:?}",
        config.generate.max_count, config.generate.count_mode
    );
    println!("  Segments: {}", config.generate.num_segments);

    println!("\nUser Agent: {}", config.user_agent.header_value());
    println!("Database: {}", config.db.path);

    println!("\nDenied Domains ({}):", config.filter.deny.len());
    for pattern in &config.filter.deny {
        println!("  - {}", pattern);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the stats command: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    use sumi_tide::output::{load_statistics, print_statistics};

    println!("Database: {}\n", config.db.path);
    let store = open_store(Path::new(&config.db.path))?;
    let stats = load_statistics(&store)?;
    print_statistics(&stats);
    Ok(())
}

/// Runs one phase against the configured database
async fn handle_phase(config: Config, config_hash: String, phase: Phase) -> anyhow::Result<()> {
    let db_path = config.db.path.clone();
    let ctx = JobContext::open(config, config_hash)
        .with_context(|| format!("failed to open crawl job on {}", db_path))?;

    match run_phase(&ctx, phase).await? {
        PhaseOutcome::Injected(summary) => println!(
            "Injected {} seeds: {} added, {} updated, {} unchanged, {} rejected",
            summary.read, summary.added, summary.updated, summary.unchanged, summary.rejected
        ),
        PhaseOutcome::Generated {
            segments,
            selected,
            dropped,
        } => {
            println!("Selected {} records ({} left for later)", selected, dropped);
            for segment in segments {
                println!("  segment {}", segment);
            }
        }
        PhaseOutcome::Fetched { segment, summary } => println!(
            "Fetched segment {}: {} ok, {} redirects, {} not modified, {} retry, {} gone, {} bytes",
            segment,
            summary.success,
            summary.redirects,
            summary.not_modified,
            summary.retry,
            summary.gone,
            summary.bytes
        ),
        PhaseOutcome::Updated { segment, summary } => println!(
            "Updated from segment {}: {} records written, {} dropped, {} failed",
            segment, summary.written, summary.dropped, summary.failed
        ),
        PhaseOutcome::External { phase, segment } => {
            println!("{} finished for segment {}", phase, segment)
        }
    }

    Ok(())
}
