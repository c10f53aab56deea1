//! Journal Reader — tolerant reader for day streams
//!
//! Features:
//! - Line-by-line decoding of NDJSON rows
//! - Malformed lines are skipped and recorded with their line number
//! - A torn final line (no trailing newline) is reported as truncated
//! - Discovery of every day partition in a directory, oldest first

use crate::journal::DayJournal;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use types::sample::NormalizedRow;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Corruption Log Entry ────────────────────────────────────────────

/// Structured record of a line that could not be decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct CorruptionRecord {
    /// Stream the line belongs to.
    pub path: PathBuf,
    /// 1-based line number.
    pub line: usize,
    pub kind: CorruptionKind,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CorruptionKind {
    InvalidUtf8,
    InvalidRow,
    TruncatedLine,
}

// ── Journal Reader ──────────────────────────────────────────────────

/// Reads every decodable row of one day stream.
pub struct JournalReader {
    path: PathBuf,
    data: Vec<u8>,
    corruption_log: Vec<CorruptionRecord>,
}

impl JournalReader {
    /// Load a day stream into memory.
    pub fn open(path: &Path) -> Result<Self, ReaderError> {
        let data = fs::read(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            data,
            corruption_log: Vec::new(),
        })
    }

    /// Decode all rows in file order, recording lines that fail.
    pub fn read_all(&mut self) -> Vec<NormalizedRow> {
        let mut rows = Vec::new();
        let ends_with_newline = self.data.last() == Some(&b'\n');
        let lines: Vec<&[u8]> = self.data.split(|b| *b == b'\n').collect();
        let last_idx = lines.len().saturating_sub(1);

        for (idx, raw) in lines.iter().enumerate() {
            let line_no = idx + 1;
            let text = match std::str::from_utf8(raw) {
                Ok(text) => text.trim(),
                Err(e) => {
                    self.corruption_log.push(CorruptionRecord {
                        path: self.path.clone(),
                        line: line_no,
                        kind: CorruptionKind::InvalidUtf8,
                        detail: e.to_string(),
                    });
                    continue;
                }
            };
            if text.is_empty() {
                continue;
            }

            match serde_json::from_str::<NormalizedRow>(text) {
                Ok(row) => rows.push(row),
                Err(e) => {
                    let kind = if idx == last_idx && !ends_with_newline {
                        CorruptionKind::TruncatedLine
                    } else {
                        CorruptionKind::InvalidRow
                    };
                    self.corruption_log.push(CorruptionRecord {
                        path: self.path.clone(),
                        line: line_no,
                        kind,
                        detail: e.to_string(),
                    });
                }
            }
        }
        rows
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get all accumulated corruption records.
    pub fn corruption_log(&self) -> &[CorruptionRecord] {
        &self.corruption_log
    }
}

/// Day streams in `dir` as `(day, path)`, oldest day first.
pub fn discover_partitions(dir: &Path) -> Result<Vec<(String, PathBuf)>, ReaderError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut partitions: Vec<(String, PathBuf)> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            let day = DayJournal::parse_day(&name)?.to_string();
            Some((day, e.path()))
        })
        .collect();

    partitions.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(partitions)
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::{RowSink, SyncPolicy};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;
    use types::ids::EntityId;
    use types::sample::{FeedPoint, Position};

    fn write_rows(dir: &Path, day: &str, names: &[&str]) -> PathBuf {
        let mut journal = DayJournal::open(dir, day, SyncPolicy::OnFinish).unwrap();
        for (i, name) in names.iter().enumerate() {
            let point = FeedPoint {
                entity_id: EntityId::new(*name),
                position: Position::new(-12.0 - i as f64, 131.0),
            };
            let row = NormalizedRow::from_point(
                Utc.with_ymd_and_hms(2025, 8, 24, 10, i as u32, 0).unwrap(),
                &point,
                "bwsc_kml",
            );
            journal.append(&row).unwrap();
        }
        let path = journal.path().to_path_buf();
        journal.finish().unwrap();
        path
    }

    #[test]
    fn test_sequential_read() {
        let tmp = TempDir::new().unwrap();
        let path = write_rows(tmp.path(), "2025-08-24", &["A", "B", "C"]);

        let mut reader = JournalReader::open(&path).unwrap();
        let rows = reader.read_all();
        let names: Vec<&str> = rows.iter().map(|r| r.entity_id.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
        assert!(reader.corruption_log().is_empty());
    }

    #[test]
    fn test_empty_partition_reads_no_rows() {
        let tmp = TempDir::new().unwrap();
        let path = write_rows(tmp.path(), "2025-08-24", &[]);

        let mut reader = JournalReader::open(&path).unwrap();
        assert!(reader.read_all().is_empty());
        assert!(reader.corruption_log().is_empty());
    }

    #[test]
    fn test_malformed_line_skipped_and_logged() {
        let tmp = TempDir::new().unwrap();
        let path = write_rows(tmp.path(), "2025-08-24", &["A"]);
        let mut data = fs::read(&path).unwrap();
        data.extend_from_slice(b"{\"entityId\": 42}\n");
        data.extend_from_slice(&[0xff, 0xfe, b'\n']);
        fs::write(&path, &data).unwrap();
        write_more(&path, "B");

        let mut reader = JournalReader::open(&path).unwrap();
        let rows = reader.read_all();
        assert_eq!(rows.len(), 2);

        let log = reader.corruption_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].line, 2);
        assert_eq!(log[0].kind, CorruptionKind::InvalidRow);
        assert_eq!(log[1].line, 3);
        assert_eq!(log[1].kind, CorruptionKind::InvalidUtf8);
    }

    fn write_more(path: &Path, name: &str) {
        let dir = path.parent().unwrap();
        let mut journal = DayJournal::open(dir, "2025-08-24", SyncPolicy::EveryRow).unwrap();
        let point = FeedPoint {
            entity_id: EntityId::new(name),
            position: Position::new(-13.0, 131.5),
        };
        journal
            .append(&NormalizedRow::from_point(Utc::now(), &point, "bwsc_kml"))
            .unwrap();
        journal.finish().unwrap();
    }

    #[test]
    fn test_torn_final_line_reported_as_truncated() {
        let tmp = TempDir::new().unwrap();
        let path = write_rows(tmp.path(), "2025-08-24", &["A", "B"]);
        let mut data = fs::read(&path).unwrap();
        data.extend_from_slice(b"{\"fetchTimestamp\":\"2025-08-24T10:");
        fs::write(&path, &data).unwrap();

        let mut reader = JournalReader::open(&path).unwrap();
        assert_eq!(reader.read_all().len(), 2);
        assert_eq!(reader.corruption_log().len(), 1);
        assert_eq!(reader.corruption_log()[0].kind, CorruptionKind::TruncatedLine);
    }

    #[test]
    fn test_discover_partitions_sorted_by_day() {
        let tmp = TempDir::new().unwrap();
        write_rows(tmp.path(), "2025-08-25", &["A"]);
        write_rows(tmp.path(), "2025-08-23", &["A"]);
        fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();
        fs::create_dir_all(tmp.path().join("raw")).unwrap();

        let days: Vec<String> = discover_partitions(tmp.path())
            .unwrap()
            .into_iter()
            .map(|(day, _)| day)
            .collect();
        assert_eq!(days, vec!["2025-08-23".to_string(), "2025-08-25".to_string()]);
    }

    #[test]
    fn test_discover_missing_dir() {
        let tmp = TempDir::new().unwrap();
        assert!(discover_partitions(&tmp.path().join("nope")).unwrap().is_empty());
    }
}
