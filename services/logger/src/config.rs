use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use persistence::{EventLogConfig, SyncPolicy};

/// World Solar Challenge live telemetry feed.
pub const DEFAULT_FEED_URL: &str = "https://telemetry.worldsolarchallenge.org/wscearth/latest.kml";

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SyncMode {
    /// fsync after every row
    EveryRow,
    /// fsync once per cycle
    OnFinish,
}

impl From<SyncMode> for SyncPolicy {
    fn from(mode: SyncMode) -> Self {
        match mode {
            SyncMode::EveryRow => SyncPolicy::EveryRow,
            SyncMode::OnFinish => SyncPolicy::OnFinish,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Fetch the telemetry feed and record it in the event log", long_about = None)]
pub struct IngestorConfig {
    /// Feed to fetch
    #[arg(long, env = "TRACKER_FEED_URL", default_value = DEFAULT_FEED_URL)]
    pub feed_url: String,

    /// Event log directory
    #[arg(long, env = "TRACKER_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Run a cycle every N seconds instead of once
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub every: Option<u64>,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Tag stamped on every recorded row
    #[arg(long, default_value = persistence::event_log::DEFAULT_SOURCE_TAG)]
    pub source_tag: String,

    /// When day streams are fsynced
    #[arg(long, value_enum, default_value_t = SyncMode::EveryRow)]
    pub sync: SyncMode,

    /// Log at debug level
    #[arg(short, long)]
    pub verbose: bool,
}

impl IngestorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn interval(&self) -> Option<Duration> {
        self.every.map(Duration::from_secs)
    }

    pub fn event_log_config(&self) -> EventLogConfig {
        EventLogConfig {
            source_tag: self.source_tag.clone(),
            sync_policy: self.sync.into(),
            ..EventLogConfig::new(&self.data_dir)
        }
    }
}
