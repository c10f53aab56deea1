//! Snapshot queries: where every entity was at a moment
//!
//! For each entity the reported sample is the rightmost one at or before the
//! query time. Positions are never interpolated, and an entity whose first
//! sample is later than the query time is simply absent.

use serde::Serialize;
use types::ids::EntityId;
use types::sample::Position;

use crate::index::{TimeSeriesIndex, Timeline};
use crate::search::{locate, SearchMode};

/// Snapshot options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotConfig {
    /// Omit entities whose latest sample is older than this many ms.
    /// `None` keeps every entity regardless of age.
    pub max_age_ms: Option<i64>,
}

impl SnapshotConfig {
    pub fn with_max_age_ms(max_age_ms: i64) -> Self {
        Self {
            max_age_ms: Some(max_age_ms),
        }
    }
}

/// One entity's last known position.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotEntry {
    pub entity_id: EntityId,
    pub position: Position,
    pub sample_timestamp: i64,
}

/// Positions of every entity at one timeline step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub timeline_index: usize,
    pub at: i64,
    /// In entity id order.
    pub entries: Vec<SnapshotEntry>,
}

/// Last known position of every entity at `target` (epoch ms).
pub fn snapshot_at(index: &TimeSeriesIndex, target: i64, config: &SnapshotConfig) -> Vec<SnapshotEntry> {
    index
        .iter()
        .filter_map(|series| {
            let idx = locate(series.times(), target, SearchMode::AtOrBefore)?;
            let sample_timestamp = series.times()[idx];
            if let Some(max_age) = config.max_age_ms {
                if target - sample_timestamp > max_age {
                    return None;
                }
            }
            Some(SnapshotEntry {
                entity_id: series.entity_id().clone(),
                position: series.positions()[idx],
                sample_timestamp,
            })
        })
        .collect()
}

/// Snapshot at timeline step `i`; `None` past the end of the timeline.
pub fn snapshot_at_index(
    index: &TimeSeriesIndex,
    timeline: &Timeline,
    i: usize,
    config: &SnapshotConfig,
) -> Option<Snapshot> {
    let at = timeline.get(i)?;
    Some(Snapshot {
        timeline_index: i,
        at,
        entries: snapshot_at(index, at, config),
    })
}

/// Snapshots over every timeline step, in order.
pub struct Playback<'a> {
    index: &'a TimeSeriesIndex,
    timeline: &'a Timeline,
    config: SnapshotConfig,
    next: usize,
}

impl<'a> Playback<'a> {
    pub fn new(index: &'a TimeSeriesIndex, timeline: &'a Timeline, config: SnapshotConfig) -> Self {
        Self {
            index,
            timeline,
            config,
            next: 0,
        }
    }
}

impl Iterator for Playback<'_> {
    type Item = Snapshot;

    fn next(&mut self) -> Option<Snapshot> {
        let snapshot = snapshot_at_index(self.index, self.timeline, self.next, &self.config)?;
        self.next += 1;
        Some(snapshot)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.timeline.len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}
