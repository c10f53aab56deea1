//! Query session over a loaded index
//!
//! A session owns the index and its timeline for as long as the data set is
//! being queried. It is immutable once built, so it can be shared across
//! threads behind an `Arc` and queried concurrently.

use serde::Serialize;

use crate::index::{TimeSeriesIndex, Timeline};
use crate::leaderboard::{leaderboard_at, Leaderboard, ScrubRange};
use crate::snapshot::{snapshot_at_index, Playback, Snapshot, SnapshotConfig};

/// Whether there is anything to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SessionState {
    NoData,
    #[serde(rename_all = "camelCase")]
    Ready {
        first: i64,
        last: i64,
        entities: usize,
        samples: usize,
    },
}

#[derive(Debug, Clone)]
pub struct Session {
    index: TimeSeriesIndex,
    timeline: Timeline,
}

impl Session {
    pub fn new(index: TimeSeriesIndex) -> Self {
        let timeline = index.timeline();
        Self { index, timeline }
    }

    pub fn index(&self) -> &TimeSeriesIndex {
        &self.index
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn state(&self) -> SessionState {
        match self.timeline.bounds() {
            None => SessionState::NoData,
            Some((first, last)) => SessionState::Ready {
                first,
                last,
                entities: self.index.len(),
                samples: self.index.sample_count(),
            },
        }
    }

    /// Snapshot at timeline step `i`; `None` past the end.
    pub fn snapshot(&self, i: usize, config: &SnapshotConfig) -> Option<Snapshot> {
        snapshot_at_index(&self.index, &self.timeline, i, config)
    }

    pub fn playback(&self, config: SnapshotConfig) -> Playback<'_> {
        Playback::new(&self.index, &self.timeline, config)
    }

    pub fn leaderboard(&self, target: i64, top_n: usize) -> Leaderboard {
        leaderboard_at(&self.index, target, top_n)
    }

    /// Scrubber range over the data, `None` when it would be disabled.
    pub fn scrub_range(&self, step: i64) -> Option<ScrubRange> {
        ScrubRange::new(self.timeline.bounds(), step)
    }
}
