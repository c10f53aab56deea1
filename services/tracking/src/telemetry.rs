//! Telemetry Import — CSV exports of the race telemetry system
//!
//! The organisers publish a CSV of every position report with team metadata
//! alongside it. Column names are matched case-insensitively after trimming
//! whitespace and a byte-order mark; the first column with a given name wins.
//!
//! Required columns: `time`, `latitude`, `longitude`, `messengerid`.
//! Optional columns: `team`, `shortname`, `car`, `teamnum`, `class`, `speed`,
//! `altitude`, `distance`.
//!
//! A row is skipped when its time or coordinates do not parse, or when an
//! optional numeric column holds something other than a number, `NaN` or
//! nothing. Skipped rows never fail the import.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use types::ids::EntityId;
use types::sample::Position;
use types::time::parse_date_text;

use crate::manifest::ManifestEntry;
use crate::partition::UNKNOWN_DIR;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV missing required columns {missing:?} (have {have:?})")]
    MissingColumns {
        missing: Vec<&'static str>,
        have: Vec<String>,
    },
}

// ── Records ─────────────────────────────────────────────────────────

/// One position report with the team metadata it was published with.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    /// Epoch milliseconds, UTC.
    pub timestamp: i64,
    pub position: Position,
    /// km/h
    pub speed: Option<f64>,
    /// Metres
    pub altitude: Option<f64>,
    /// Kilometres travelled, as reported by the source.
    pub distance_km: Option<f64>,
    /// Team name, or the short name when the team column is empty.
    pub team: String,
    pub team_number: String,
    pub short_name: String,
    pub car_name: String,
    pub messenger_id: String,
    pub race_class: String,
}

impl TelemetryRecord {
    /// Key the record is grouped under: short name, then team number, then
    /// messenger id, then team name.
    pub fn entity_key(&self) -> &str {
        [
            &self.short_name,
            &self.team_number,
            &self.messenger_id,
            &self.team,
        ]
        .into_iter()
        .map(String::as_str)
        .find(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_DIR)
    }

    pub fn entity_id(&self) -> EntityId {
        EntityId::try_new(self.entity_key()).unwrap_or_else(|| EntityId::new(UNKNOWN_DIR))
    }

    /// Fill `entry` with this record's descriptive fields. Empty fields leave
    /// what `entry` already has.
    pub fn describe(&self, mut entry: ManifestEntry) -> ManifestEntry {
        if !self.team.is_empty() {
            entry.display_name = Some(self.team.clone());
        }
        if !self.race_class.is_empty() {
            entry.classification_tag = Some(self.race_class.clone());
        }
        for (key, value) in [
            ("messengerid", &self.messenger_id),
            ("teamnum", &self.team_number),
            ("shortname", &self.short_name),
            ("carname", &self.car_name),
        ] {
            if !value.is_empty() {
                entry
                    .extra
                    .insert(key.to_string(), serde_json::Value::String(value.clone()));
            }
        }
        entry
    }
}

/// A row that was left out of the import.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedRow {
    /// 1-based line in the file.
    pub line: u64,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct TelemetryImport {
    pub records: Vec<TelemetryRecord>,
    pub skipped: Vec<SkippedRow>,
}

// ── Columns ─────────────────────────────────────────────────────────

fn normalize_header(header: &str) -> String {
    header.trim().trim_start_matches('\u{feff}').trim().to_lowercase()
}

/// Column positions resolved from the header row.
#[derive(Debug, Clone, Copy)]
struct Columns {
    time: usize,
    lat: usize,
    lon: usize,
    messenger_id: usize,
    team: Option<usize>,
    short_name: Option<usize>,
    car_name: Option<usize>,
    team_number: Option<usize>,
    race_class: Option<usize>,
    speed: Option<usize>,
    altitude: Option<usize>,
    distance: Option<usize>,
}

impl Columns {
    fn resolve(headers: &StringRecord) -> Result<Self, ImportError> {
        let mut by_name: BTreeMap<String, usize> = BTreeMap::new();
        for (i, header) in headers.iter().enumerate() {
            by_name.entry(normalize_header(header)).or_insert(i);
        }
        let find = |name: &str| by_name.get(name).copied();

        let required = [
            ("time", find("time")),
            ("latitude", find("latitude")),
            ("longitude", find("longitude")),
            ("messengerid", find("messengerid")),
        ];
        match required {
            [(_, Some(time)), (_, Some(lat)), (_, Some(lon)), (_, Some(messenger_id))] => Ok(Self {
                time,
                lat,
                lon,
                messenger_id,
                team: find("team"),
                short_name: find("shortname"),
                car_name: find("car"),
                team_number: find("teamnum"),
                race_class: find("class"),
                speed: find("speed"),
                altitude: find("altitude"),
                distance: find("distance"),
            }),
            _ => Err(ImportError::MissingColumns {
                missing: required
                    .iter()
                    .filter(|(_, idx)| idx.is_none())
                    .map(|(name, _)| *name)
                    .collect(),
                have: by_name.into_keys().collect(),
            }),
        }
    }

    fn record(&self, row: &StringRecord) -> Result<TelemetryRecord, String> {
        let field = |idx: usize| row.get(idx).map(str::trim);
        let text = |idx: Option<usize>| {
            idx.and_then(|i| field(i))
                .unwrap_or_default()
                .to_string()
        };

        let time = field(self.time).ok_or("missing time")?;
        let timestamp = parse_date_text(time).ok_or_else(|| format!("unparseable time {time:?}"))?;
        let lat = coordinate(field(self.lat), "latitude")?;
        let lon = coordinate(field(self.lon), "longitude")?;
        let messenger_id = field(self.messenger_id).ok_or("missing messengerid")?.to_string();

        let short_name = text(self.short_name);
        let mut team = text(self.team);
        if team.is_empty() {
            team = short_name.clone();
        }

        Ok(TelemetryRecord {
            timestamp,
            position: Position::new(lat, lon),
            speed: measurement(self.speed.and_then(|i| field(i)), "speed")?,
            altitude: measurement(self.altitude.and_then(|i| field(i)), "altitude")?,
            distance_km: measurement(self.distance.and_then(|i| field(i)), "distance")?,
            team,
            team_number: text(self.team_number),
            short_name,
            car_name: text(self.car_name),
            messenger_id,
            race_class: text(self.race_class),
        })
    }
}

fn coordinate(value: Option<&str>, name: &str) -> Result<f64, String> {
    let value = value.ok_or_else(|| format!("missing {name}"))?;
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("invalid {name} {value:?}"))
}

/// Optional numeric column: empty or `NaN` is absent, a non-finite number is
/// dropped, anything else that is not a number rejects the row.
fn measurement(value: Option<&str>, name: &str) -> Result<Option<f64>, String> {
    match value {
        None | Some("") | Some("NaN") => Ok(None),
        Some(v) => v
            .parse::<f64>()
            .map(|n| n.is_finite().then_some(n))
            .map_err(|_| format!("invalid {name} {v:?}")),
    }
}

// ── Parsing ─────────────────────────────────────────────────────────

/// Parse a telemetry CSV from any reader.
pub fn parse_telemetry<R: Read>(input: R) -> Result<TelemetryImport, ImportError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input);
    let columns = Columns::resolve(reader.headers()?)?;

    let mut import = TelemetryImport::default();
    for (i, result) in reader.records().enumerate() {
        // Header is line 1
        let fallback_line = i as u64 + 2;
        let outcome = match result {
            Ok(row) => {
                let line = row.position().map_or(fallback_line, |p| p.line());
                columns.record(&row).map_err(|reason| SkippedRow { line, reason })
            }
            Err(e) => Err(SkippedRow {
                line: e.position().map_or(fallback_line, |p| p.line()),
                reason: e.to_string(),
            }),
        };
        match outcome {
            Ok(record) => import.records.push(record),
            Err(skipped) => {
                debug!(line = skipped.line, reason = %skipped.reason, "Skipping telemetry row");
                import.skipped.push(skipped);
            }
        }
    }

    info!(
        records = import.records.len(),
        skipped = import.skipped.len(),
        "Telemetry parsed"
    );
    Ok(import)
}

/// Parse the telemetry CSV at `path`.
pub fn read_telemetry(path: &Path) -> Result<TelemetryImport, ImportError> {
    parse_telemetry(File::open(path)?)
}
