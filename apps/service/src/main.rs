mod config;
mod runner;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::level_filters::LevelFilter;
use vigil::strategy::http::HttpStrategy;
use vigil::strategy::reach::ReachStrategy;
use vigil::strategy::tcp::TcpStrategy;
use vigil::{AggregateStore, StatRollup, StrategyRegistry};

use crate::config::Config;
use crate::runner::Scheduler;

#[derive(Debug, Parser)]
#[command(name = "vigil-service", about = "Runs configured health checks and rolls up results")]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Print registered strategies with their config schemas and exit
    #[arg(long)]
    list_strategies: bool,
}

fn build_registry() -> Result<StrategyRegistry> {
    let mut registry = StrategyRegistry::new();
    registry.register(HttpStrategy, "vigil")?;
    registry.register(TcpStrategy, "vigil")?;
    registry.register(ReachStrategy, "vigil")?;
    Ok(registry)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logger::init_with(if args.verbose { LevelFilter::DEBUG } else { LevelFilter::INFO });

    let registry = build_registry().context("strategy registration failed")?;

    if args.list_strategies {
        let meta = registry.strategies_with_meta();
        println!("{}", serde_json::to_string_pretty(&meta)?);
        return Ok(());
    }

    let config = Config::from_config(args.config.as_deref()).context("failed to load config")?;
    let checks = runner::prepare_checks(&registry, &config)?;
    if checks.is_empty() {
        tracing::warn!("no checks configured, nothing to do");
        return Ok(());
    }
    tracing::info!(checks = checks.len(), "starting scheduler");

    let store = Arc::new(AggregateStore::new());
    let (result_tx, result_rx) = mpsc::channel(64);
    let scheduler = Scheduler::new(result_tx);
    let handles = scheduler.schedule_checks(checks);
    let aggregator = tokio::spawn(runner::aggregate_runs(
        Arc::clone(&store),
        config.engine.bucket_interval_seconds,
        result_rx,
    ));

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    tracing::info!("shutting down");

    for handle in &handles {
        handle.abort();
    }
    drop(scheduler);
    aggregator.await.ok();

    summarize(&store);
    Ok(())
}

/// Log one availability/latency line per aggregate series on the way out
fn summarize(store: &AggregateStore) {
    for (key, interval_seconds) in store.keys() {
        for aggregate in store.get_aggregates(&key, 0..i64::MAX, interval_seconds) {
            let Ok(rollup) = StatRollup::from_value(&aggregate.metadata) else {
                continue;
            };
            tracing::info!(
                series = %key,
                bucket_start = aggregate.bucket_start,
                runs = aggregate.run_count,
                availability = rollup.availability.ratio(),
                avg_latency_ms = rollup.latency_ms.mean(),
                errors = rollup.error_count,
                "bucket summary"
            );
        }
    }
}
