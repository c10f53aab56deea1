//! Event Log — the durable record of every ingestion cycle
//!
//! A cycle that fetched successfully is recorded in two steps:
//! 1. the unmodified feed body is written as a raw snapshot keyed by the
//!    cycle's fetch time;
//! 2. the cycle's feed points are appended as normalized rows to the stream
//!    of the cycle's UTC day, best effort per row.
//!
//! The day stream is opened (and so created) before any row is appended,
//! which leaves the partition in place even for a cycle with zero rows.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use types::ids::CycleId;
use types::sample::{FeedPoint, NormalizedRow};
use types::time::day_key;

use crate::journal::{append_best_effort, DayJournal, JournalError, SyncPolicy};
use crate::reader::{discover_partitions, CorruptionRecord, JournalReader, ReaderError};
use crate::snapshot::{RawSnapshot, RawSnapshotStore, SnapshotError};

/// Default tag stamped on rows from the KML feed.
pub const DEFAULT_SOURCE_TAG: &str = "bwsc_kml";

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum EventLogError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Raw snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Journal error: {0}")]
    Journal(#[from] JournalError),

    #[error("Reader error: {0}")]
    Reader(#[from] ReaderError),
}

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for the event log.
#[derive(Debug, Clone)]
pub struct EventLogConfig {
    /// Root directory; day streams live here, raw snapshots under `raw/`.
    pub root: PathBuf,
    /// File extension of raw snapshots.
    pub raw_extension: String,
    /// Tag stamped on every row.
    pub source_tag: String,
    /// Sync policy for day streams.
    pub sync_policy: SyncPolicy,
}

impl EventLogConfig {
    /// Create a config with sensible defaults.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            raw_extension: "kml".to_string(),
            source_tag: DEFAULT_SOURCE_TAG.to_string(),
            sync_policy: SyncPolicy::EveryRow,
        }
    }

    /// Directory holding raw snapshots.
    pub fn raw_dir(&self) -> PathBuf {
        self.root.join("raw")
    }

    /// Store over the raw snapshots of this log.
    pub fn raw_store(&self) -> RawSnapshotStore {
        RawSnapshotStore::new(self.raw_dir(), self.raw_extension.clone())
    }
}

// ── Reports ─────────────────────────────────────────────────────────

/// What one recorded cycle left on disk.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: CycleId,
    pub fetched_at: DateTime<Utc>,
    pub raw: RawSnapshot,
    /// Day stream the rows went to.
    pub partition: PathBuf,
    pub appended: u64,
    pub failed: u64,
}

/// Everything readable from the log.
#[derive(Debug, Clone, Default)]
pub struct LogContents {
    /// Rows of every day stream, oldest day first, file order within a day.
    pub rows: Vec<NormalizedRow>,
    pub corruption: Vec<CorruptionRecord>,
}

// ── Event Log ───────────────────────────────────────────────────────

pub struct EventLog {
    config: EventLogConfig,
    raw: RawSnapshotStore,
}

impl EventLog {
    /// Open the log, creating its directories.
    pub fn open(config: EventLogConfig) -> Result<Self, EventLogError> {
        std::fs::create_dir_all(config.raw_dir())?;

        info!(
            root = %config.root.display(),
            source_tag = %config.source_tag,
            "EventLog opened"
        );

        let raw = config.raw_store();
        Ok(Self { config, raw })
    }

    pub fn config(&self) -> &EventLogConfig {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    pub fn raw(&self) -> &RawSnapshotStore {
        &self.raw
    }

    /// Day stream path for the day containing `at`.
    pub fn partition_path(&self, at: &DateTime<Utc>) -> PathBuf {
        DayJournal::partition_path(&self.config.root, &day_key(at))
    }

    /// Record one successfully fetched cycle.
    ///
    /// Raw snapshot and stream-open failures are returned; individual row
    /// failures are counted in the report.
    pub fn record_cycle(
        &self,
        cycle_id: CycleId,
        fetched_at: DateTime<Utc>,
        body: &str,
        points: &[FeedPoint],
    ) -> Result<CycleReport, EventLogError> {
        let raw = self.raw.write(&fetched_at, body)?;
        info!(
            cycle = %cycle_id,
            path = %raw.path.display(),
            bytes = raw.bytes,
            "Saved raw snapshot"
        );

        let mut journal = DayJournal::open(
            &self.config.root,
            &day_key(&fetched_at),
            self.config.sync_policy,
        )?;
        let partition = journal.path().to_path_buf();

        let rows: Vec<NormalizedRow> = points
            .iter()
            .map(|p| NormalizedRow::from_point(fetched_at, p, self.config.source_tag.as_str()))
            .collect();
        let summary = append_best_effort(&mut journal, &rows);
        journal.finish()?;

        if summary.failed > 0 {
            warn!(
                cycle = %cycle_id,
                failed = summary.failed,
                appended = summary.appended,
                "Some rows could not be appended"
            );
        }
        info!(
            cycle = %cycle_id,
            appended = summary.appended,
            partition = %partition.display(),
            "Appended rows"
        );

        Ok(CycleReport {
            cycle_id,
            fetched_at,
            raw,
            partition,
            appended: summary.appended,
            failed: summary.failed,
        })
    }

    /// Read every day stream.
    pub fn read_rows(&self) -> Result<LogContents, EventLogError> {
        read_log_dir(&self.config.root)
    }
}

/// Read every day stream under `root` without opening (or creating) a log.
pub fn read_log_dir(root: &Path) -> Result<LogContents, EventLogError> {
    let mut contents = LogContents::default();
    for (day, path) in discover_partitions(root)? {
        let mut reader = JournalReader::open(&path)?;
        let rows = reader.read_all();
        if !reader.corruption_log().is_empty() {
            warn!(
                day = %day,
                skipped = reader.corruption_log().len(),
                "Skipped malformed lines"
            );
        }
        contents.rows.extend(rows);
        contents
            .corruption
            .extend(reader.corruption_log().iter().cloned());
    }
    Ok(contents)
}

// ── Tests ───────────────────────────────────────────────────────────
