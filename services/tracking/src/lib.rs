//! Race Tracking
//!
//! Turns the telemetry feed into per-entity time series and answers
//! point-in-time questions over them:
//! - Feed parsing (tolerant KML placemark extraction)
//! - Per-entity sorted series with cumulative great-circle distance
//! - Snapshots: last known position of every entity at a moment
//! - Leaderboards: ranking by distance travelled as of a moment
//! - Export of event log rows or telemetry CSV records into per-entity
//!   partitions plus a manifest, and concurrent loading of those partitions
//!   back into an index
//!
//! # Architecture
//!
//! ```text
//!   Feed body        Event log rows   Telemetry CSV
//!       │                  │                │
//!   ┌───▼───┐              │          ┌─────▼─────┐
//!   │ feed  │              │          │ telemetry │
//!   └───┬───┘              │          └─────┬─────┘
//!       │                  └──────┬─────────┘
//!   (event log)            ┌──────▼────┐
//!                          │ partition │ ← export per entity
//!                          └─────┬─────┘
//!                                │
//!                          ┌─────▼─────┐
//!                          │  loader   │ ← fan-out, per-entity isolation
//!                          └─────┬─────┘
//!                                │
//!                          ┌─────▼─────┐
//!                          │   index   │ ← sorted series + distance
//!                          └─────┬─────┘
//!                                │
//!                   ┌────────────┴────────────┐
//!                   │                         │
//!              ┌────▼─────┐            ┌──────▼──────┐
//!              │ snapshot │            │ leaderboard │
//!              └──────────┘            └─────────────┘
//! ```

pub mod distance;
pub mod feed;
pub mod index;
pub mod leaderboard;
pub mod loader;
pub mod manifest;
pub mod partition;
pub mod search;
pub mod session;
pub mod snapshot;
pub mod telemetry;

pub use feed::{parse_feed, FeedDiagnostics};
pub use index::{TimeSeries, TimeSeriesIndex, Timeline};
pub use leaderboard::{leaderboard_at, Leaderboard, ScrubRange, Standing, DEFAULT_TOP_N};
pub use loader::{load_index, DirectorySource, LoadOutcome, PartitionSource};
pub use manifest::{ClassFilter, Manifest, ManifestEntry};
pub use partition::{DuplicatePolicy, ExportSample, PartitionWriter};
pub use session::{Session, SessionState};
pub use snapshot::{snapshot_at, snapshot_at_index, Playback, Snapshot, SnapshotConfig, SnapshotEntry};
pub use telemetry::{parse_telemetry, read_telemetry, TelemetryImport, TelemetryRecord};

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
