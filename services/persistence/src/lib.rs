//! Event Log Service
//!
//! Provides the append-only, durable side of the tracker: one immutable raw
//! snapshot of the feed body per ingestion cycle, and one growing stream of
//! normalized rows (NDJSON) per UTC day.
//!
//! # Layout
//! ```text
//! <root>/
//!   raw/2025-08-24T10-29-08-123Z.kml     one per cycle, never overwritten
//!   raw/2025-08-24T10-29-08-123Z.kml.sha256   its digest
//!   day-2025-08-24.ndjson                appended by every cycle of that day
//! ```
//!
//! Rows are never updated or deleted. Readers skip (and report) malformed
//! lines instead of failing the whole stream.

pub mod event_log;
pub mod journal;
pub mod reader;
pub mod snapshot;

pub use event_log::{CycleReport, EventLog, EventLogConfig, EventLogError, LogContents};
pub use journal::{AppendSummary, DayJournal, JournalError, RowSink, SyncPolicy};
pub use reader::{CorruptionKind, CorruptionRecord, JournalReader, ReaderError};
pub use snapshot::{RawSnapshot, RawSnapshotStore, SnapshotError};
