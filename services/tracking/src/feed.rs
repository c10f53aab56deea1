//! Feed Parser — tolerant KML placemark extraction
//!
//! Turns the telemetry feed body into ordered [`FeedPoint`]s. The feed is
//! treated as loosely structured text rather than a document: record tags may
//! carry a namespace prefix (`<kml:Placemark>`), and a record that is missing
//! its name or carries unusable coordinates is skipped without affecting the
//! rest.
//!
//! Parsing is pure: no deduplication, no I/O, empty input gives empty output.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;
use types::errors::MalformedRecord;
use types::ids::EntityId;
use types::sample::{FeedPoint, Position};

fn record_open_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"<([\w:]*Placemark)\b[^>]*>").unwrap_or_else(|e| panic!("record regex: {e}"))
    })
}

fn record_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"<[\w:]*Placemark\b").unwrap_or_else(|e| panic!("record tag regex: {e}"))
    })
}

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<name>(.*?)</name>").unwrap_or_else(|e| panic!("name regex: {e}"))
    })
}

fn coordinates_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<coordinates>(.*?)</coordinates>")
            .unwrap_or_else(|e| panic!("coordinates regex: {e}"))
    })
}

fn separator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",\s*").unwrap_or_else(|e| panic!("separator regex: {e}")))
}

/// Bodies of every complete record in `markup`, in document order.
///
/// A record runs from its opening tag to the first closing tag with the same
/// (prefixed) name. An opening tag that is never closed is ignored.
pub fn record_bodies(markup: &str) -> Vec<&str> {
    let mut bodies = Vec::new();
    let mut cursor = 0;

    while let Some(caps) = record_open_re().captures_at(markup, cursor) {
        let (Some(open), Some(tag)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        let closing = format!("</{}>", tag.as_str());
        match markup[open.end()..].find(&closing) {
            Some(offset) => {
                let body_end = open.end() + offset;
                bodies.push(&markup[open.end()..body_end]);
                cursor = body_end + closing.len();
            }
            None => cursor = open.end(),
        }
    }
    bodies
}

/// Decide one record: a feed point, or why it was skipped.
pub fn parse_record(body: &str) -> Result<FeedPoint, MalformedRecord> {
    let name = name_re()
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or("");
    let entity_id = EntityId::try_new(name).ok_or(MalformedRecord::MissingName)?;

    let raw = coordinates_re()
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .ok_or(MalformedRecord::MissingCoordinates)?;

    // KML order is lon,lat[,alt]
    let mut parts = separator_re().split(raw);
    let lon = parts.next().and_then(parse_number);
    let lat = parts.next().and_then(parse_number);

    match (lat, lon) {
        (Some(lat), Some(lon)) => Ok(FeedPoint {
            entity_id,
            position: Position::new(lat, lon),
        }),
        _ => Err(MalformedRecord::InvalidCoordinates {
            raw: raw.to_string(),
        }),
    }
}

fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Extract every well-formed record of the feed, in document order.
pub fn parse_feed(markup: &str) -> Vec<FeedPoint> {
    record_bodies(markup)
        .into_iter()
        .filter_map(|body| match parse_record(body) {
            Ok(point) => Some(point),
            Err(reason) => {
                debug!(%reason, "Skipping malformed record");
                None
            }
        })
        .collect()
}

/// Cheap size figures of a feed body, logged once per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeedDiagnostics {
    /// Body size in bytes.
    pub bytes: usize,
    /// Record opening tags seen, complete or not.
    pub record_tags: usize,
}

impl FeedDiagnostics {
    pub fn inspect(markup: &str) -> Self {
        Self {
            bytes: markup.len(),
            record_tags: record_tag_re().find_iter(markup).count(),
        }
    }
}
