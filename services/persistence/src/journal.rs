//! Day Journal — append-only NDJSON stream of normalized rows
//!
//! One file per UTC day (`day-YYYY-MM-DD.ndjson`), one self-contained JSON
//! object per line. Opening a day's journal creates the file, so the
//! partition exists even when a cycle appends nothing.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;
use types::sample::NormalizedRow;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

// ── Sync Policy ─────────────────────────────────────────────────────

/// Controls when appended rows are flushed and fsynced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPolicy {
    /// Flush + fsync after every row.
    #[default]
    EveryRow,
    /// Flush + fsync once, when the journal is finished.
    OnFinish,
}

// ── Row Sink ────────────────────────────────────────────────────────

/// Destination for normalized rows.
pub trait RowSink {
    fn append(&mut self, row: &NormalizedRow) -> Result<(), JournalError>;
}

/// Outcome of a best-effort append run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AppendSummary {
    pub appended: u64,
    pub failed: u64,
}

/// Append every row, continuing past individual failures.
///
/// A row that fails is logged and counted; it never stops the rows after it.
pub fn append_best_effort<S: RowSink + ?Sized>(sink: &mut S, rows: &[NormalizedRow]) -> AppendSummary {
    let mut summary = AppendSummary::default();
    for row in rows {
        match sink.append(row) {
            Ok(()) => summary.appended += 1,
            Err(e) => {
                summary.failed += 1;
                warn!(
                    entity = %row.entity_id,
                    error = %e,
                    "Failed to append row, continuing"
                );
            }
        }
    }
    summary
}

// ── Day Journal ─────────────────────────────────────────────────────

/// Append-only writer for one day's row stream.
pub struct DayJournal {
    path: PathBuf,
    writer: BufWriter<File>,
    policy: SyncPolicy,
    rows_written: u64,
}

impl DayJournal {
    /// Open (creating if needed) the stream for `day` (`YYYY-MM-DD`) in `dir`.
    pub fn open(dir: &Path, day: &str, policy: SyncPolicy) -> Result<Self, JournalError> {
        fs::create_dir_all(dir)?;

        let path = Self::partition_path(dir, day);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            policy,
            rows_written: 0,
        })
    }

    /// Path of the stream for `day` in `dir`.
    pub fn partition_path(dir: &Path, day: &str) -> PathBuf {
        dir.join(format!("day-{}.ndjson", day))
    }

    /// Day key of a stream file name, if it is one.
    pub fn parse_day(file_name: &str) -> Option<&str> {
        let day = file_name.strip_prefix("day-")?.strip_suffix(".ndjson")?;
        (day.len() == 10).then_some(day)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows appended through this handle.
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Flush + fsync whatever is buffered and close the journal.
    pub fn finish(mut self) -> Result<u64, JournalError> {
        self.sync()?;
        Ok(self.rows_written)
    }

    fn sync(&mut self) -> Result<(), JournalError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }
}

impl RowSink for DayJournal {
    fn append(&mut self, row: &NormalizedRow) -> Result<(), JournalError> {
        let mut line =
            serde_json::to_vec(row).map_err(|e| JournalError::Serialization(e.to_string()))?;
        line.push(b'\n');

        // One write per line keeps a row from being split across writes
        self.writer.write_all(&line)?;
        if self.policy == SyncPolicy::EveryRow {
            self.sync()?;
        }
        self.rows_written += 1;
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────
