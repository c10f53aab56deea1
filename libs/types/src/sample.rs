//! Position samples and persisted rows
//!
//! A [`FeedPoint`] is what the feed parser extracts from one record; the
//! ingestion cycle stamps it with the fetch time and persists it as a
//! [`NormalizedRow`]. The query layer works on [`Sample`]s, built either from
//! rows or from per-entity series files ([`SeriesPoint`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::ids::EntityId;
use crate::time::TimestampValue;

/// Geographic position in decimal degrees (WGS84).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
}

impl Position {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Both coordinates are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}

/// One record extracted from the feed, not yet timestamped.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedPoint {
    pub entity_id: EntityId,
    pub position: Position,
}

/// One timestamped position report for an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub entity_id: EntityId,
    /// Milliseconds since the Unix epoch, UTC
    pub timestamp: i64,
    pub position: Position,
}

/// A persisted sample: one line of a day stream.
///
/// Legacy streams wrote `ts_fetch`, `team` and `src`; those names are still
/// accepted when reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedRow {
    #[serde(alias = "ts_fetch")]
    pub fetch_timestamp: DateTime<Utc>,
    #[serde(alias = "team")]
    pub entity_id: EntityId,
    pub lat: f64,
    pub lon: f64,
    #[serde(alias = "src")]
    pub source_tag: String,
}

impl NormalizedRow {
    /// Stamp a feed point with the cycle's fetch time.
    pub fn from_point(
        fetched_at: DateTime<Utc>,
        point: &FeedPoint,
        source_tag: impl Into<String>,
    ) -> Self {
        Self {
            fetch_timestamp: fetched_at,
            entity_id: point.entity_id.clone(),
            lat: point.position.lat,
            lon: point.position.lon,
            source_tag: source_tag.into(),
        }
    }

    pub fn position(&self) -> Position {
        Position::new(self.lat, self.lon)
    }

    /// The sample this row records, timestamped at the fetch time.
    pub fn to_sample(&self) -> Sample {
        Sample {
            entity_id: self.entity_id.clone(),
            timestamp: self.fetch_timestamp.timestamp_millis(),
            position: self.position(),
        }
    }
}

/// One element of a per-entity series file.
///
/// Every field is optional on the wire, and a field of the wrong type reads
/// as absent rather than failing the file: coordinates may be numbers or
/// numeric strings, timestamps numbers or date text. Points missing any field
/// are dropped when the series is indexed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SeriesPoint {
    #[serde(default, alias = "timestamp", alias = "t", deserialize_with = "lenient_timestamp")]
    pub ts: Option<TimestampValue>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub lon: Option<f64>,
    /// Speed in km/h, when the source reported one.
    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Altitude in metres, when the source reported one.
    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub alt: Option<f64>,
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<TimestampValue>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64().map(TimestampValue::Number),
        Value::String(s) => Some(TimestampValue::Text(s)),
        _ => None,
    })
}

impl SeriesPoint {
    pub fn new(ts: impl Into<TimestampValue>, lat: f64, lon: f64) -> Self {
        Self {
            ts: Some(ts.into()),
            lat: Some(lat),
            lon: Some(lon),
            ..Default::default()
        }
    }

    /// Normalized `(timestamp_ms, position)`, or `None` when any part is
    /// missing or not finite.
    pub fn normalize(&self) -> Option<(i64, Position)> {
        let timestamp = self.ts.as_ref()?.normalize()?;
        let position = Position::new(self.lat?, self.lon?);
        position.is_finite().then_some((timestamp, position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fetched_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 24, 10, 29, 8).unwrap()
    }

    #[test]
    fn test_position_finite() {
        assert!(Position::new(-12.46, 130.84).is_finite());
        assert!(!Position::new(f64::NAN, 0.0).is_finite());
        assert!(!Position::new(0.0, f64::INFINITY).is_finite());
    }

    #[test]
    fn test_row_wire_format() {
        let point = FeedPoint {
            entity_id: EntityId::new("Brunel"),
            position: Position::new(-12.5, 130.9),
        };
        let row = NormalizedRow::from_point(fetched_at(), &point, "bwsc_kml");
        let json = serde_json::to_value(&row).unwrap();

        assert_eq!(json["entityId"], "Brunel");
        assert_eq!(json["sourceTag"], "bwsc_kml");
        assert_eq!(json["lat"], -12.5);
        assert_eq!(json["lon"], 130.9);
        assert_eq!(json["fetchTimestamp"], "2025-08-24T10:29:08Z");
    }

    #[test]
    fn test_row_accepts_legacy_field_names() {
        let line = r#"{"ts_fetch":"2025-08-24T10:29:08.000Z","team":"Agoria","lat":-12.1,"lon":131.0,"src":"bwsc_kml"}"#;
        let row: NormalizedRow = serde_json::from_str(line).unwrap();
        assert_eq!(row.entity_id.as_str(), "Agoria");
        assert_eq!(row.fetch_timestamp, fetched_at());
        assert_eq!(row.source_tag, "bwsc_kml");
    }

    #[test]
    fn test_row_to_sample_uses_fetch_time() {
        let point = FeedPoint {
            entity_id: EntityId::new("Innoptus"),
            position: Position::new(-20.0, 134.0),
        };
        let sample = NormalizedRow::from_point(fetched_at(), &point, "bwsc_kml").to_sample();
        assert_eq!(sample.timestamp, fetched_at().timestamp_millis());
        assert_eq!(sample.position, Position::new(-20.0, 134.0));
    }

    #[test]
    fn test_series_point_aliases_and_encodings() {
        let points: Vec<SeriesPoint> = serde_json::from_str(
            r#"[
                {"ts": "2025-08-24T10:29:08Z", "lat": -12.0, "lon": 131.0},
                {"timestamp": 1756031348, "lat": -12.0, "lon": 131.0},
                {"t": 1756031348000, "lat": -12.0, "lon": 131.0}
            ]"#,
        )
        .unwrap();
        let expected = fetched_at().timestamp_millis();
        for point in &points {
            assert_eq!(point.normalize().map(|(t, _)| t), Some(expected));
        }
    }

    #[test]
    fn test_series_point_missing_fields_dropped() {
        let points: Vec<SeriesPoint> = serde_json::from_str(
            r#"[{"lat": 1.0, "lon": 2.0}, {"ts": 1756031348, "lon": 2.0}, {"ts": null, "lat": 1.0, "lon": 2.0}, {"ts": "soon", "lat": 1.0, "lon": 2.0}]"#,
        )
        .unwrap();
        assert!(points.iter().all(|p| p.normalize().is_none()));
    }

    #[test]
    fn test_series_point_wrong_types_read_as_absent() {
        let points: Vec<SeriesPoint> = serde_json::from_str(
            r#"[
                {"ts": 1756031348, "lat": "n/a", "lon": 130.9},
                {"ts": true, "lat": -12.0, "lon": 131.0},
                {"ts": 1756031348, "lat": {"deg": 1}, "lon": [130.9]}
            ]"#,
        )
        .unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].lat, None);
        assert_eq!(points[0].lon, Some(130.9));
        assert_eq!(points[1].ts, None);
        assert!(points.iter().all(|p| p.normalize().is_none()));
    }

    #[test]
    fn test_series_point_numeric_strings_accepted() {
        let point: SeriesPoint =
            serde_json::from_str(r#"{"ts": "2025-08-24T10:29:08Z", "lat": "-12.4", "lon": " 130.8 ", "speed": "88.5"}"#)
                .unwrap();
        assert_eq!(
            point.normalize(),
            Some((fetched_at().timestamp_millis(), Position::new(-12.4, 130.8)))
        );
        assert_eq!(point.speed, Some(88.5));
        assert_eq!(point.alt, None);
    }

    #[test]
    fn test_series_point_optional_fields_omitted_when_absent() {
        let json = serde_json::to_value(SeriesPoint::new("2025-08-24T10:29:08Z", -12.0, 131.0)).unwrap();
        assert_eq!(json, serde_json::json!({"ts": "2025-08-24T10:29:08Z", "lat": -12.0, "lon": 131.0}));
    }
}
