//! Partition Exporter — per-entity partitions from the event log or a
//! telemetry CSV
//!
//! Groups samples by entity, orders each group by time and writes:
//! - `teams/<dir>/timeseries.json`: `[{ts, lat, lon[, speed][, alt]}]`
//! - `teams/index.json`: the manifest, with per-entity sample counts
//!
//! Event log rows carry no team metadata, so their manifest entries come from
//! the base manifest. Telemetry records describe their team; the latest
//! record of each entity fills in its entry.
//!
//! Files are written to a temporary name and renamed into place, so a loader
//! never sees a half-written partition.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use types::ids::EntityId;
use types::sample::{NormalizedRow, Position, SeriesPoint};
use types::time::{format_utc, TimestampValue};

use crate::loader::{DirectorySource, SERIES_FILE};
use crate::manifest::{Manifest, ManifestEntry};
use crate::telemetry::TelemetryRecord;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Timestamp out of range: {0}")]
    TimestampOutOfRange(i64),
}

// ── Configuration ───────────────────────────────────────────────────

/// What to do with several samples of one entity at the same timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Keep every sample.
    #[default]
    KeepAll,
    /// Keep only the last sample (in row order) per timestamp.
    KeepLast,
}

/// Fallback directory name when nothing of the key survives sanitizing.
pub const UNKNOWN_DIR: &str = "UNKNOWN";

/// Directory name for an entity key: ASCII alphanumerics, `-` and `_`.
pub fn sanitize_dir_name(key: &str) -> String {
    let sanitized: String = key
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if sanitized.is_empty() {
        UNKNOWN_DIR.to_string()
    } else {
        sanitized
    }
}

fn round_to(v: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (v * scale).round() / scale
}

/// One sample headed for a partition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportSample {
    pub timestamp: i64,
    pub position: Position,
    pub speed: Option<f64>,
    pub altitude: Option<f64>,
}

impl ExportSample {
    pub fn at(timestamp: i64, position: Position) -> Self {
        Self {
            timestamp,
            position,
            speed: None,
            altitude: None,
        }
    }

    fn to_point(self) -> Result<SeriesPoint, ExportError> {
        let ts = format_utc(self.timestamp).ok_or(ExportError::TimestampOutOfRange(self.timestamp))?;
        Ok(SeriesPoint {
            ts: Some(TimestampValue::Text(ts)),
            lat: Some(round_to(self.position.lat, 6)),
            lon: Some(round_to(self.position.lon, 6)),
            speed: self.speed.map(|v| round_to(v, 2)),
            alt: self.altitude.map(|v| round_to(v, 1)),
        })
    }
}

impl From<&TelemetryRecord> for ExportSample {
    fn from(record: &TelemetryRecord) -> Self {
        Self {
            timestamp: record.timestamp,
            position: record.position,
            speed: record.speed,
            altitude: record.altitude,
        }
    }
}

/// Order one entity's samples (stable for equal timestamps) and apply the
/// duplicate policy.
pub fn prepare_series(mut samples: Vec<ExportSample>, policy: DuplicatePolicy) -> Vec<ExportSample> {
    samples.sort_by_key(|s| s.timestamp);
    if policy == DuplicatePolicy::KeepLast {
        let mut kept: Vec<ExportSample> = Vec::with_capacity(samples.len());
        for sample in samples {
            match kept.last_mut() {
                Some(last) if last.timestamp == sample.timestamp => *last = sample,
                _ => kept.push(sample),
            }
        }
        return kept;
    }
    samples
}

// ── Summary ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    pub entities: usize,
    pub rows_in: usize,
    pub rows_written: usize,
    /// Samples dropped by the duplicate policy.
    pub collapsed: usize,
    pub manifest_path: PathBuf,
}

// ── Writer ──────────────────────────────────────────────────────────

pub struct PartitionWriter {
    target: DirectorySource,
    policy: DuplicatePolicy,
}

impl PartitionWriter {
    /// Writer for partitions under `root/teams`.
    pub fn new(root: impl Into<PathBuf>, policy: DuplicatePolicy) -> Self {
        Self {
            target: DirectorySource::new(root),
            policy,
        }
    }

    /// Export event log `rows`. Names and classification tags already known
    /// in `base` are carried into the written manifest.
    pub fn export(&self, rows: &[NormalizedRow], base: &Manifest) -> Result<ExportSummary, ExportError> {
        let mut grouped: BTreeMap<EntityId, Vec<ExportSample>> = BTreeMap::new();
        for row in rows {
            let position = row.position();
            if !position.is_finite() {
                debug!(entity = %row.entity_id, "Skipping row with non-finite position");
                continue;
            }
            grouped
                .entry(row.entity_id.clone())
                .or_default()
                .push(ExportSample::at(row.fetch_timestamp.timestamp_millis(), position));
        }

        let entries = grouped
            .into_iter()
            .map(|(entity_id, samples)| {
                let entry = base.get(&entity_id).cloned().unwrap_or_default();
                (entity_id, (entry, samples))
            })
            .collect();
        self.write_partitions(entries, rows.len())
    }

    /// Export telemetry `records`, grouped by their entity key. Each entity's
    /// manifest entry starts from `base` and takes the descriptive fields of
    /// its latest record.
    pub fn export_telemetry(
        &self,
        records: &[TelemetryRecord],
        base: &Manifest,
    ) -> Result<ExportSummary, ExportError> {
        let mut grouped: BTreeMap<EntityId, Vec<&TelemetryRecord>> = BTreeMap::new();
        for record in records {
            grouped.entry(record.entity_id()).or_default().push(record);
        }

        let entries = grouped
            .into_iter()
            .map(|(entity_id, mut group)| {
                group.sort_by_key(|r| r.timestamp);
                let base_entry = base.get(&entity_id).cloned().unwrap_or_default();
                let entry = match group.last() {
                    Some(latest) => latest.describe(base_entry),
                    None => base_entry,
                };
                let samples = group.into_iter().map(ExportSample::from).collect();
                (entity_id, (entry, samples))
            })
            .collect();
        self.write_partitions(entries, records.len())
    }

    fn write_partitions(
        &self,
        entities: BTreeMap<EntityId, (ManifestEntry, Vec<ExportSample>)>,
        rows_in: usize,
    ) -> Result<ExportSummary, ExportError> {
        let teams_dir = self.target.teams_dir();
        fs::create_dir_all(&teams_dir)?;

        let mut manifest = Manifest::new();
        let mut used_dirs: BTreeSet<String> = BTreeSet::new();
        let mut rows_written = 0;
        let mut collapsed = 0;

        for (entity_id, (mut entry, samples)) in entities {
            let before = samples.len();
            let series = prepare_series(samples, self.policy);
            if series.len() != before {
                debug!(entity = %entity_id, before, after = series.len(), "Collapsed duplicate timestamps");
            }
            collapsed += before - series.len();

            let dir = unique_dir(&entity_id, &mut used_dirs);
            let points = series
                .into_iter()
                .map(ExportSample::to_point)
                .collect::<Result<Vec<_>, ExportError>>()?;

            write_atomic(&self.target.series_path(&dir), &serde_json::to_vec(&points)?)?;
            rows_written += points.len();

            entry.partition_key = Some(dir);
            entry.count = Some(points.len() as u64);
            manifest.insert(entity_id, entry);
        }

        let manifest_path = self.target.manifest_path();
        write_atomic(&manifest_path, &serde_json::to_vec_pretty(&manifest)?)?;

        info!(
            entities = manifest.len(),
            rows = rows_written,
            collapsed,
            path = %manifest_path.display(),
            "Partitions exported"
        );

        Ok(ExportSummary {
            entities: manifest.len(),
            rows_in,
            rows_written,
            collapsed,
            manifest_path,
        })
    }
}

/// Sanitized directory name, suffixed when another entity already took it.
fn unique_dir(entity_id: &EntityId, used: &mut BTreeSet<String>) -> String {
    let base = sanitize_dir_name(entity_id.as_str());
    let mut dir = base.clone();
    let mut n = 2;
    while used.contains(&dir) {
        dir = format!("{base}-{n}");
        n += 1;
    }
    if dir != base {
        warn!(entity = %entity_id, dir = %dir, "Directory name already taken, using suffix");
    }
    used.insert(dir.clone());
    dir
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<(), ExportError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("json.tmp");
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ClassFilter;
    use crate::telemetry::parse_telemetry;
    use chrono::{DateTime, TimeZone, Utc};
    use tempfile::TempDir;
    use types::sample::FeedPoint;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 24, 10, minute, 0).unwrap()
    }

    fn row(name: &str, minute: u32, lat: f64, lon: f64) -> NormalizedRow {
        let point = FeedPoint {
            entity_id: EntityId::new(name),
            position: Position::new(lat, lon),
        };
        NormalizedRow::from_point(at(minute), &point, "bwsc_kml")
    }

    fn read_series(root: &Path, dir: &str) -> Vec<SeriesPoint> {
        let text = fs::read_to_string(root.join("teams").join(dir).join(SERIES_FILE)).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    #[test]
    fn test_sanitize_dir_name() {
        assert_eq!(sanitize_dir_name("Top Dutch"), "TopDutch");
        assert_eq!(sanitize_dir_name("team_06-b"), "team_06-b");
        assert_eq!(sanitize_dir_name("../etc"), "etc");
        assert_eq!(sanitize_dir_name("Élan"), "lan");
        assert_eq!(sanitize_dir_name("!!!"), UNKNOWN_DIR);
    }

    #[test]
    fn test_prepare_series_policies() {
        let samples = vec![
            ExportSample::at(200, Position::new(2.0, 0.0)),
            ExportSample::at(100, Position::new(1.0, 0.0)),
            ExportSample::at(200, Position::new(2.5, 0.0)),
        ];
        let all = prepare_series(samples.clone(), DuplicatePolicy::KeepAll);
        assert_eq!(all.len(), 3);
        assert_eq!(all[1].position, Position::new(2.0, 0.0));

        let last = prepare_series(samples, DuplicatePolicy::KeepLast);
        assert_eq!(
            last,
            vec![
                ExportSample::at(100, Position::new(1.0, 0.0)),
                ExportSample::at(200, Position::new(2.5, 0.0)),
            ]
        );
    }

    #[test]
    fn test_export_writes_partitions_and_manifest() {
        let tmp = TempDir::new().unwrap();
        let rows = vec![
            row("Top Dutch", 5, -12.1234567, 130.9),
            row("Agoria", 0, -12.0, 131.0),
            row("Top Dutch", 0, -12.0, 130.8),
        ];
        let mut base = Manifest::new();
        base.insert(
            EntityId::new("Agoria"),
            ManifestEntry {
                display_name: Some("Agoria Solar Team".to_string()),
                classification_tag: Some("challenger".to_string()),
                ..Default::default()
            },
        );

        let writer = PartitionWriter::new(tmp.path(), DuplicatePolicy::KeepAll);
        let summary = writer.export(&rows, &base).unwrap();
        assert_eq!(summary.entities, 2);
        assert_eq!(summary.rows_written, 3);
        assert_eq!(summary.collapsed, 0);

        let series = read_series(tmp.path(), "TopDutch");
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].ts, Some(TimestampValue::Text("2025-08-24T10:00:00Z".to_string())));
        assert_eq!(series[1].lat, Some(-12.123457));

        let manifest = Manifest::load(&summary.manifest_path).unwrap();
        let agoria = manifest.get(&EntityId::new("Agoria")).unwrap();
        assert_eq!(agoria.display_name.as_deref(), Some("Agoria Solar Team"));
        assert_eq!(agoria.classification_tag(), Some("challenger"));
        assert_eq!(agoria.count, Some(1));
        let dutch = manifest.get(&EntityId::new("Top Dutch")).unwrap();
        assert_eq!(dutch.partition_key.as_deref(), Some("TopDutch"));
    }

    #[test]
    fn test_keep_last_collapses_duplicates() {
        let tmp = TempDir::new().unwrap();
        let rows = vec![row("A", 0, 1.0, 1.0), row("A", 0, 2.0, 2.0), row("A", 1, 3.0, 3.0)];

        let writer = PartitionWriter::new(tmp.path(), DuplicatePolicy::KeepLast);
        let summary = writer.export(&rows, &Manifest::new()).unwrap();
        assert_eq!(summary.collapsed, 1);

        let series = read_series(tmp.path(), "A");
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].lat, Some(2.0));
    }

    #[test]
    fn test_colliding_dir_names_get_suffix() {
        let tmp = TempDir::new().unwrap();
        let rows = vec![row("A B", 0, 1.0, 1.0), row("AB", 0, 2.0, 2.0)];

        let writer = PartitionWriter::new(tmp.path(), DuplicatePolicy::KeepAll);
        let summary = writer.export(&rows, &Manifest::new()).unwrap();
        let manifest = Manifest::load(&summary.manifest_path).unwrap();

        let dirs: BTreeSet<String> = manifest
            .iter()
            .filter_map(|(_, e)| e.partition_key.clone())
            .collect();
        assert_eq!(dirs, BTreeSet::from(["AB".to_string(), "AB-2".to_string()]));
    }

    #[test]
    fn test_export_of_no_rows_writes_empty_manifest() {
        let tmp = TempDir::new().unwrap();
        let writer = PartitionWriter::new(tmp.path(), DuplicatePolicy::KeepAll);
        let summary = writer.export(&[], &Manifest::new()).unwrap();
        assert_eq!(summary.entities, 0);
        assert!(Manifest::load(&summary.manifest_path).unwrap().is_empty());
    }

    const TELEMETRY: &str = "time,latitude,longitude,messengerid,team,shortname,car,teamnum,class,speed,altitude\n\
        2025-08-24T10:05:00Z,-12.1000004,130.9,0-111,Top Dutch Solar Racing,TopDutch,Green Lightning,6,Challenger,88.456,32.16\n\
        2025-08-24T10:00:00Z,-12.0,130.8,0-111,Top Dutch,TopDutch,,6,Challenger,,\n\
        2025-08-24T10:05:00Z,-12.2,131.0,0-111,Top Dutch Solar Racing,TopDutch,Green Lightning,6,Challenger,90,\n\
        2025-08-24T10:00:00Z,-13.0,131.5,0-222,Sun Riders,,,,Cruiser,,\n";

    #[test]
    fn test_export_telemetry_fills_manifest_from_latest_record() {
        let tmp = TempDir::new().unwrap();
        let import = parse_telemetry(TELEMETRY.as_bytes()).unwrap();

        let writer = PartitionWriter::new(tmp.path(), DuplicatePolicy::KeepAll);
        let summary = writer.export_telemetry(&import.records, &Manifest::new()).unwrap();
        assert_eq!(summary.entities, 2);
        assert_eq!(summary.rows_in, 4);
        assert_eq!(summary.rows_written, 4);

        let manifest = Manifest::load(&summary.manifest_path).unwrap();
        let dutch = manifest.get(&EntityId::new("TopDutch")).unwrap();
        assert_eq!(dutch.display_name.as_deref(), Some("Top Dutch Solar Racing"));
        assert_eq!(dutch.classification_tag(), Some("Challenger"));
        assert_eq!(dutch.extra["carname"], "Green Lightning");
        assert_eq!(dutch.count, Some(3));

        // No short name or team number: keyed by messenger id
        let riders = manifest.get(&EntityId::new("0-222")).unwrap();
        assert_eq!(riders.display_name.as_deref(), Some("Sun Riders"));
        assert_eq!(riders.partition_key.as_deref(), Some("0-222"));

        let filter = ClassFilter::Only("challenger".to_string());
        let selected: Vec<&str> = manifest
            .select(&filter)
            .map(|(id, _)| id.as_str())
            .collect();
        assert_eq!(selected, vec!["TopDutch"]);
    }

    #[test]
    fn test_export_telemetry_writes_speed_and_altitude() {
        let tmp = TempDir::new().unwrap();
        let import = parse_telemetry(TELEMETRY.as_bytes()).unwrap();

        let writer = PartitionWriter::new(tmp.path(), DuplicatePolicy::KeepLast);
        let summary = writer.export_telemetry(&import.records, &Manifest::new()).unwrap();
        assert_eq!(summary.collapsed, 1);

        let series = read_series(tmp.path(), "TopDutch");
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].speed, None);
        // Last record of the 10:05 pair wins
        assert_eq!(series[1].lat, Some(-12.2));
        assert_eq!(series[1].speed, Some(90.0));
        assert_eq!(series[1].alt, None);

        let text = fs::read_to_string(tmp.path().join("teams/TopDutch").join(SERIES_FILE)).unwrap();
        assert!(!text.contains("alt"));

        let writer = PartitionWriter::new(tmp.path(), DuplicatePolicy::KeepAll);
        writer.export_telemetry(&import.records, &Manifest::new()).unwrap();
        let series = read_series(tmp.path(), "TopDutch");
        assert_eq!(series[1].lat, Some(-12.1));
        assert_eq!(series[1].speed, Some(88.46));
        assert_eq!(series[1].alt, Some(32.2));
    }
}
