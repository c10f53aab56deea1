mod config;
mod cycle;
mod error;
mod fetch;

use std::io;

use anyhow::Context;
use clap::Parser;
use persistence::EventLog;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use config::IngestorConfig;
use cycle::Ingestor;
use fetch::HttpFeed;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = IngestorConfig::parse();

    let default_level = if config.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    tracing::info!(url = %config.feed_url, data_dir = %config.data_dir.display(), "Starting feed logger");

    let log = EventLog::open(config.event_log_config())
        .with_context(|| format!("opening event log at {}", config.data_dir.display()))?;
    let feed = HttpFeed::new(config.feed_url.clone(), config.timeout()).context("building HTTP client")?;
    let ingestor = Ingestor::new(feed, log);

    let Some(every) = config.interval() else {
        let report = ingestor.run_cycle().await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    };

    info!(every_secs = every.as_secs(), "Running on a fixed cadence");
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // A failed cycle is logged; the next tick proceeds
                if let Err(e) = ingestor.run_cycle().await {
                    error!(error = %e, "Cycle failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                return Ok(());
            }
        }
    }
}
