//! Leaderboard queries: who has travelled farthest as of a moment
//!
//! Each entity contributes its cumulative distance at the sample nearest to
//! the target time (clamped to its first and last sample). Standings are
//! ranked by distance, farthest first, with entity id breaking ties.

use serde::Serialize;
use types::ids::EntityId;
use types::time::{quantize, FIVE_MINUTES_MS};

use crate::index::TimeSeriesIndex;
use crate::manifest::Manifest;
use crate::search::{locate, SearchMode};

/// Standings shown by default.
pub const DEFAULT_TOP_N: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Standing {
    /// 1-based.
    pub rank: usize,
    pub entity_id: EntityId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub distance_km: f64,
    /// Timestamp of the sample the distance was read at.
    pub sample_timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Leaderboard {
    pub target: i64,
    pub standings: Vec<Standing>,
    /// Top-ranked entity over the full ranking, before truncation.
    pub leader: Option<EntityId>,
}

impl Leaderboard {
    /// Attach display names known to `manifest`.
    pub fn with_labels(mut self, manifest: &Manifest) -> Self {
        for standing in &mut self.standings {
            standing.label = manifest.label(&standing.entity_id);
        }
        self
    }
}

/// Rank every entity at `target` (epoch ms) and keep the top `top_n`.
pub fn leaderboard_at(index: &TimeSeriesIndex, target: i64, top_n: usize) -> Leaderboard {
    let mut ranked: Vec<(EntityId, f64, i64)> = index
        .iter()
        .filter_map(|series| {
            let idx = locate(series.times(), target, SearchMode::Nearest)?;
            Some((
                series.entity_id().clone(),
                series.cumulative_km()[idx],
                series.times()[idx],
            ))
        })
        .collect();

    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let leader = ranked.first().map(|(id, _, _)| id.clone());
    let standings = ranked
        .into_iter()
        .take(top_n)
        .enumerate()
        .map(|(i, (entity_id, distance_km, sample_timestamp))| Standing {
            rank: i + 1,
            entity_id,
            label: None,
            distance_km,
            sample_timestamp,
        })
        .collect();

    Leaderboard {
        target,
        standings,
        leader,
    }
}

/// Bounds and step of a time scrubber over the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrubRange {
    pub min: i64,
    pub max: i64,
    pub step: i64,
}

impl ScrubRange {
    /// Range over `bounds`; `None` when there is nothing to scrub
    /// (no data, or `min >= max`).
    pub fn new(bounds: Option<(i64, i64)>, step: i64) -> Option<Self> {
        let (min, max) = bounds?;
        if min >= max || step <= 0 {
            return None;
        }
        Some(Self { min, max, step })
    }

    /// Range with the default five-minute step.
    pub fn five_minute(bounds: Option<(i64, i64)>) -> Option<Self> {
        Self::new(bounds, FIVE_MINUTES_MS)
    }

    /// Clamp `ms` into the range and round it to the nearest step.
    pub fn snap(&self, ms: i64) -> i64 {
        quantize(ms.clamp(self.min, self.max), self.step)
    }

    /// Initial scrubber position: the end of the data, snapped.
    pub fn initial(&self) -> i64 {
        self.snap(self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestEntry;
    use types::sample::{Position, Sample};

    fn sample(entity: &str, timestamp: i64, lat: f64) -> Sample {
        Sample {
            entity_id: EntityId::new(entity),
            timestamp,
            position: Position::new(lat, 0.0),
        }
    }

    fn ids(board: &Leaderboard) -> Vec<&str> {
        board.standings.iter().map(|s| s.entity_id.as_str()).collect()
    }

    #[test]
    fn test_ranked_by_distance_descending() {
        let index = TimeSeriesIndex::from_samples(vec![
            sample("Slow", 0, 0.0),
            sample("Slow", 100, 1.0),
            sample("Fast", 0, 0.0),
            sample("Fast", 100, 3.0),
            sample("Still", 0, 0.0),
        ]);
        let board = leaderboard_at(&index, 100, DEFAULT_TOP_N);
        assert_eq!(ids(&board), vec!["Fast", "Slow", "Still"]);
        assert_eq!(board.leader, Some(EntityId::new("Fast")));
        assert_eq!(board.standings[0].rank, 1);
        assert_eq!(board.standings[2].distance_km, 0.0);
    }

    #[test]
    fn test_nearest_sample_used() {
        let index = TimeSeriesIndex::from_samples(vec![sample("A", 0, 0.0), sample("A", 100, 1.0)]);

        // Tie at 50 favors the earlier sample
        let board = leaderboard_at(&index, 50, DEFAULT_TOP_N);
        assert_eq!(board.standings[0].sample_timestamp, 0);
        assert_eq!(board.standings[0].distance_km, 0.0);

        let board = leaderboard_at(&index, 51, DEFAULT_TOP_N);
        assert_eq!(board.standings[0].sample_timestamp, 100);

        // Before the first sample clamps to it
        let board = leaderboard_at(&index, -500, DEFAULT_TOP_N);
        assert_eq!(board.standings[0].sample_timestamp, 0);
    }

    #[test]
    fn test_ties_broken_by_entity_id() {
        let index = TimeSeriesIndex::from_samples(vec![
            sample("Charlie", 0, 0.0),
            sample("Alpha", 0, 0.0),
            sample("Bravo", 0, 0.0),
        ]);
        let board = leaderboard_at(&index, 0, DEFAULT_TOP_N);
        assert_eq!(ids(&board), vec!["Alpha", "Bravo", "Charlie"]);
    }

    #[test]
    fn test_truncation_keeps_true_leader() {
        let mut samples = Vec::new();
        for i in 0..15 {
            let name = format!("E{i:02}");
            samples.push(sample(&name, 0, 0.0));
            samples.push(sample(&name, 10, i as f64 * 0.1));
        }
        let index = TimeSeriesIndex::from_samples(samples);

        let board = leaderboard_at(&index, 10, DEFAULT_TOP_N);
        assert_eq!(board.standings.len(), 10);
        assert_eq!(board.leader, Some(EntityId::new("E14")));
        assert_eq!(board.standings[0].entity_id, EntityId::new("E14"));

        let board = leaderboard_at(&index, 10, 0);
        assert!(board.standings.is_empty());
        assert_eq!(board.leader, Some(EntityId::new("E14")));
    }

    #[test]
    fn test_empty_index() {
        let board = leaderboard_at(&TimeSeriesIndex::new(), 0, DEFAULT_TOP_N);
        assert!(board.standings.is_empty());
        assert_eq!(board.leader, None);
    }

    #[test]
    fn test_labels_from_manifest() {
        let index = TimeSeriesIndex::from_samples(vec![sample("A", 0, 0.0), sample("B", 0, 0.0)]);
        let mut manifest = Manifest::new();
        manifest.insert(
            EntityId::new("A"),
            ManifestEntry {
                display_name: Some("Alpha Team".to_string()),
                ..Default::default()
            },
        );

        let board = leaderboard_at(&index, 0, DEFAULT_TOP_N).with_labels(&manifest);
        assert_eq!(board.standings[0].label.as_deref(), Some("Alpha Team"));
        assert_eq!(board.standings[1].label, None);
    }

    #[test]
    fn test_scrub_range() {
        assert_eq!(ScrubRange::five_minute(None), None);
        assert_eq!(ScrubRange::five_minute(Some((1_000, 1_000))), None);

        let range = ScrubRange::five_minute(Some((0, 3_600_000))).unwrap();
        assert_eq!(range.step, FIVE_MINUTES_MS);
        assert_eq!(range.initial(), 3_600_000);
        assert_eq!(range.snap(149_999), 0);
        assert_eq!(range.snap(150_000), 300_000);
        assert_eq!(range.snap(-10), 0);
    }
}
