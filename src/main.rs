// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/transit-sentinel

//! Transit Sentinel - service disruption monitor
//!
//! Watches a position store and raises alerts for stalled vehicles, bunching,
//! under-served routes and vehicles that stop reporting.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use transit_sentinel::simulator::FleetSimulator;
use transit_sentinel::{Config, Monitor, SqlitePositionStore, StatsReport, VERSION};

/// Seconds between synthetic fleet updates in demo mode
const DEMO_FEED_INTERVAL_SECS: u64 = 15;

/// Transit Sentinel - service disruption monitor
#[derive(Parser, Debug)]
#[command(name = "transit-sentinel")]
#[command(version = VERSION)]
#[command(about = "Detects stalled, bunched, sparse and silent transit vehicles")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Position database path
    #[arg(long)]
    database: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,

    /// Feed the store from a synthetic fleet
    #[arg(long)]
    demo: bool,

    /// Seconds between detection passes
    #[arg(long)]
    poll_interval: Option<u64>,

    /// Seconds between statistics reports
    #[arg(long)]
    stats_interval: Option<u64>,

    /// Run one detection pass, print statistics as JSON and exit
    #[arg(long)]
    once: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load or create configuration
    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;

    // Initialize logging
    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        config.log_level.parse().unwrap_or(Level::INFO)
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("{} v{}", transit_sentinel::NAME, VERSION);
    info!("Configuration loaded from {:?}", config_path);

    // Override with command line args
    if args.demo {
        config.demo_mode = true;
    }
    if let Some(database) = args.database {
        config.database.path = database;
    }
    if let Some(secs) = args.poll_interval {
        config.scheduling.poll_interval_secs = secs;
    }
    if let Some(secs) = args.stats_interval {
        config.scheduling.stats_interval_secs = secs;
    }

    config.validate()?;
    info!("Demo mode: {}", config.demo_mode);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config, args.once))
}

async fn run(config: Config, once: bool) -> Result<()> {
    let store = SqlitePositionStore::open(&config.database, config.scheduling.query_timeout())?;

    if config.demo_mode {
        if once {
            let reports = FleetSimulator::new(rand::random()).step(chrono::Utc::now());
            store.record_positions_batch(&reports)?;
        } else {
            spawn_demo_feed(store.clone(), &config);
        }
    }

    let mut monitor = Monitor::new(config.clone(), Arc::new(store.clone()))?;

    if once {
        let summary = monitor.run_once().await;
        info!(
            "Pass recorded {} alerts in {:?}",
            summary.alerts_recorded, summary.elapsed
        );
        let report = StatsReport::from_statistics(
            &monitor.statistics(),
            config.alerts.report_sample_size,
        );
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    monitor.start()?;

    info!("Monitoring {:?}", config.database.path);
    info!("   Press Ctrl+C to shutdown");

    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received, draining...");
    monitor.stop().await?;

    let stats = monitor.statistics();
    info!("Raised {} alerts this session", stats.total);

    match store.stats() {
        Ok(s) => info!(
            "Store holds {} reports from {} vehicles on {} routes",
            s.position_count, s.vehicle_count, s.route_count
        ),
        Err(e) => warn!("Could not read store statistics: {}", e),
    }

    info!("Transit Sentinel shutdown complete");
    Ok(())
}

/// Keep writing synthetic reports and pruning old ones
fn spawn_demo_feed(store: SqlitePositionStore, config: &Config) {
    // Bounded by MAX_WINDOW_MINUTES in validate()
    let retention = chrono::Duration::minutes(2 * config.detection.active_window_minutes as i64);

    tokio::spawn(async move {
        let mut simulator = FleetSimulator::new(rand::random());
        let mut ticker = tokio::time::interval(Duration::from_secs(DEMO_FEED_INTERVAL_SECS));
        info!("Demo feed simulating {} vehicles", simulator.vehicle_count());

        loop {
            ticker.tick().await;
            let now = chrono::Utc::now();
            let reports = simulator.step(now);
            let store = store.clone();

            let written = tokio::task::spawn_blocking(move || -> Result<usize> {
                let written = store.record_positions_batch(&reports)?;
                store.prune_older_than(now - retention)?;
                Ok(written)
            })
            .await;

            match written {
                Ok(Ok(n)) => tracing::debug!("Demo feed wrote {} reports", n),
                Ok(Err(e)) => warn!("Demo feed write failed: {}", e),
                Err(e) => warn!("Demo feed task failed: {}", e),
            }
        }
    });
}
