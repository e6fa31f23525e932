//! Stressmap CLI
//!
//! Scores wearable sensor streams and maintains the stress hotspot map.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use stressmap_engine::{
    scheduler::{self, PassReport},
    simulate::generate_batch,
    stats::create_shared_stats_with_persistence,
    Config, JsonStore, PipelineStore, RetryPolicy, RunStats, StressPipeline, VERSION,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stressmap")]
#[command(version = VERSION)]
#[command(about = "Stress scoring and hotspot aggregation for wearable sensor streams", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run scoring passes until interrupted
    Run,

    /// Run a single scoring pass
    Once,

    /// Move the hotspot map into the archive
    Flush,

    /// Queue synthetic samples in the inbox
    Simulate {
        /// Number of subjects
        #[arg(long, default_value = "3")]
        subjects: usize,

        /// Samples per subject
        #[arg(long, default_value = "150")]
        samples: usize,

        /// Draw locations from a pool of this many points (0 = all random)
        #[arg(long, default_value = "0")]
        locations: usize,
    },

    /// Show configuration summary and cumulative statistics
    Status,

    /// Show configuration
    Config,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("stressmap_engine=info,stressmap=info")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(Config::config_path);
    let config = Config::load_from(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    match cli.command {
        Commands::Run => cmd_run(&config),
        Commands::Once => cmd_once(&config),
        Commands::Flush => cmd_flush(&config),
        Commands::Simulate {
            subjects,
            samples,
            locations,
        } => cmd_simulate(&config, subjects, samples, locations),
        Commands::Status => cmd_status(&config, &config_path),
        Commands::Config => cmd_config(&config, &config_path),
    }
}

fn open_store(config: &Config) -> Result<JsonStore> {
    JsonStore::open(&config.data_path)
        .with_context(|| format!("Failed to open store at {}", config.data_path.display()))
}

fn cmd_run(config: &Config) -> Result<()> {
    println!("Stressmap Engine v{VERSION}");
    println!();
    println!("  Data path: {}", config.data_path.display());
    println!("  Poll interval: {}s", config.poll_interval.as_secs());
    println!("  Flush interval: {}s", config.flush_interval.as_secs());
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let mut store = open_store(config)?;
    let mut pipeline = StressPipeline::from_config(config).context("Invalid pipeline config")?;
    let retry = RetryPolicy::from_config(&config.retry);
    let stats = create_shared_stats_with_persistence(config.stats_path());

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone())?;

    let mut next_pass = Instant::now();
    let mut next_flush = Instant::now() + config.flush_interval;

    while running.load(Ordering::SeqCst) {
        if Instant::now() >= next_pass {
            if let Err(e) = scheduler::run_pass(&mut store, &mut pipeline, &retry, &stats) {
                tracing::debug!(error = %e, "Retrying on the next tick");
            }
            save_stats(&stats);
            next_pass = Instant::now() + config.poll_interval;
        }

        if Instant::now() >= next_flush {
            if let Err(e) = scheduler::flush(&mut store, &stats) {
                tracing::error!(error = %e, "Hotspot flush failed");
            }
            save_stats(&stats);
            next_flush = Instant::now() + config.flush_interval;
        }

        thread::sleep(Duration::from_millis(200));
    }

    println!();
    println!("Stopping...");
    stats.save().context("Failed to save run statistics")?;
    println!("{}", stats.summary());
    println!("Uptime: {}s", stats.uptime_secs());
    Ok(())
}

fn cmd_once(config: &Config) -> Result<()> {
    let mut store = open_store(config)?;
    let mut pipeline = StressPipeline::from_config(config).context("Invalid pipeline config")?;
    let retry = RetryPolicy::from_config(&config.retry);
    let stats = create_shared_stats_with_persistence(config.stats_path());

    let report = scheduler::run_pass(&mut store, &mut pipeline, &retry, &stats);
    stats.save().context("Failed to save run statistics")?;

    match report.context("Pass failed")? {
        PassReport::Idle => println!("No new samples."),
        PassReport::Completed(summary) => {
            println!("Pass completed:");
            println!("  Subjects: {} ({} warming up)", summary.subjects, summary.warming_up);
            println!("  Samples: {}", summary.samples);
            println!("  Derived records: {}", summary.derived_records);
            println!("  Hotspot increments: {}", summary.hotspots.accepted);
        }
    }
    Ok(())
}

fn cmd_flush(config: &Config) -> Result<()> {
    let mut store = open_store(config)?;
    let stats = create_shared_stats_with_persistence(config.stats_path());

    let summary = scheduler::flush(&mut store, &stats).context("Flush failed")?;
    stats.save().context("Failed to save run statistics")?;

    println!(
        "Archived {} coordinates (total intensity {}).",
        summary.coordinates, summary.intensity
    );
    Ok(())
}

fn cmd_simulate(config: &Config, subjects: usize, samples: usize, locations: usize) -> Result<()> {
    let mut store = open_store(config)?;
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let now_ms = chrono::Utc::now().timestamp_millis();
    let batch = generate_batch(&mut rng, subjects, samples, now_ms, locations);
    for (subject, readings) in &batch {
        store
            .push_samples(subject, readings)
            .with_context(|| format!("Failed to queue samples for {subject}"))?;
    }

    println!(
        "Queued {} samples for {} subjects in {}",
        subjects * samples,
        batch.len(),
        store.root().display()
    );
    Ok(())
}

fn cmd_status(config: &Config, config_path: &Path) -> Result<()> {
    println!("Stressmap Engine Status");
    println!("=======================");
    println!();

    println!("Configuration:");
    println!("  Config file: {}", config_path.display());
    println!("  Data path: {}", config.data_path.display());
    println!(
        "  Timezone: {}",
        config.timezone.as_deref().unwrap_or("system local")
    );
    println!("  Poll interval: {}s", config.poll_interval.as_secs());
    println!("  Flush interval: {}s", config.flush_interval.as_secs());
    println!("  Hotspot threshold: {}", config.hotspot_threshold);
    println!();

    let store = open_store(config)?;
    let hotspots = store.load_hotspots().context("Failed to read hotspots")?;
    let archive = store.load_archive().context("Failed to read hotspot archive")?;
    println!("Hotspots:");
    println!(
        "  Primary: {} coordinates, intensity {}",
        hotspots.len(),
        hotspots.total_intensity()
    );
    println!(
        "  Archive: {} coordinates, intensity {}",
        archive.len(),
        archive.total_intensity()
    );
    println!();

    let stats = create_shared_stats_with_persistence(config.stats_path());
    println!("{}", stats.summary());
    Ok(())
}

fn cmd_config(config: &Config, config_path: &Path) -> Result<()> {
    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {}", config_path.display());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(config).context("Failed to serialize config")?
    );
    Ok(())
}

fn save_stats(stats: &RunStats) {
    if let Err(e) = stats.save() {
        tracing::warn!(error = %e, "Could not save run statistics");
    }
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("Error setting Ctrl+C handler")
}
