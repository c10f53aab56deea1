//! Time Series Index — per-entity sorted samples
//!
//! Each entity's samples are held as parallel arrays (`times`, `positions`,
//! `cumulative_km`) sorted by normalized timestamp. The sort is stable, so
//! samples sharing a timestamp keep their input order; duplicates are never
//! collapsed here.
//!
//! Everything is built once per load and read-only afterwards.

use std::collections::{BTreeMap, BTreeSet};

use types::ids::EntityId;
use types::sample::{NormalizedRow, Position, Sample, SeriesPoint};

use crate::distance::cumulative_km;

// ── Time Series ─────────────────────────────────────────────────────

/// One entity's samples in time order.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    entity_id: EntityId,
    times: Vec<i64>,
    positions: Vec<Position>,
    cumulative_km: Vec<f64>,
}

impl TimeSeries {
    /// Build from `(timestamp_ms, position)` pairs in any order.
    ///
    /// Non-finite positions are dropped. Returns `None` when nothing valid
    /// remains.
    pub fn from_samples<I>(entity_id: EntityId, samples: I) -> Option<Self>
    where
        I: IntoIterator<Item = (i64, Position)>,
    {
        let mut samples: Vec<(i64, Position)> = samples
            .into_iter()
            .filter(|(_, position)| position.is_finite())
            .collect();
        if samples.is_empty() {
            return None;
        }
        samples.sort_by_key(|(t, _)| *t);

        let (times, positions): (Vec<i64>, Vec<Position>) = samples.into_iter().unzip();
        let cumulative_km = cumulative_km(&positions);
        Some(Self {
            entity_id,
            times,
            positions,
            cumulative_km,
        })
    }

    /// Build from wire series points, dropping any that fail to normalize.
    pub fn from_points(entity_id: EntityId, points: &[SeriesPoint]) -> Option<Self> {
        Self::from_samples(entity_id, points.iter().filter_map(SeriesPoint::normalize))
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    /// Timestamps, non-decreasing.
    pub fn times(&self) -> &[i64] {
        &self.times
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    /// Distance travelled up to each sample, in kilometres.
    pub fn cumulative_km(&self) -> &[f64] {
        &self.cumulative_km
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn first_time(&self) -> i64 {
        self.times[0]
    }

    pub fn last_time(&self) -> i64 {
        self.times[self.times.len() - 1]
    }

    /// Sample at `idx`, if in range.
    pub fn sample(&self, idx: usize) -> Option<Sample> {
        Some(Sample {
            entity_id: self.entity_id.clone(),
            timestamp: *self.times.get(idx)?,
            position: *self.positions.get(idx)?,
        })
    }
}

// ── Index ───────────────────────────────────────────────────────────

/// All entities' series, keyed by entity id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeriesIndex {
    series: BTreeMap<EntityId, TimeSeries>,
}

impl TimeSeriesIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group samples by entity and build each series.
    pub fn from_samples<I>(samples: I) -> Self
    where
        I: IntoIterator<Item = Sample>,
    {
        let mut grouped: BTreeMap<EntityId, Vec<(i64, Position)>> = BTreeMap::new();
        for sample in samples {
            grouped
                .entry(sample.entity_id)
                .or_default()
                .push((sample.timestamp, sample.position));
        }

        let mut index = Self::new();
        for (entity_id, samples) in grouped {
            if let Some(series) = TimeSeries::from_samples(entity_id, samples) {
                index.insert(series);
            }
        }
        index
    }

    /// Index persisted rows, each timestamped at its fetch time.
    pub fn from_rows(rows: &[NormalizedRow]) -> Self {
        Self::from_samples(rows.iter().map(NormalizedRow::to_sample))
    }

    /// Index per-entity wire series. Entities with no valid point are absent.
    pub fn from_series<I>(series: I) -> Self
    where
        I: IntoIterator<Item = (EntityId, Vec<SeriesPoint>)>,
    {
        let mut index = Self::new();
        for (entity_id, points) in series {
            if let Some(series) = TimeSeries::from_points(entity_id, &points) {
                index.insert(series);
            }
        }
        index
    }

    /// Add or replace one entity's series.
    pub fn insert(&mut self, series: TimeSeries) {
        self.series.insert(series.entity_id.clone(), series);
    }

    pub fn get(&self, entity_id: &EntityId) -> Option<&TimeSeries> {
        self.series.get(entity_id)
    }

    /// Series in entity id order.
    pub fn iter(&self) -> impl Iterator<Item = &TimeSeries> {
        self.series.values()
    }

    pub fn entity_ids(&self) -> impl Iterator<Item = &EntityId> {
        self.series.keys()
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Samples across every entity.
    pub fn sample_count(&self) -> usize {
        self.series.values().map(TimeSeries::len).sum()
    }

    /// Earliest and latest timestamp across every entity.
    pub fn bounds(&self) -> Option<(i64, i64)> {
        let first = self.series.values().map(TimeSeries::first_time).min()?;
        let last = self.series.values().map(TimeSeries::last_time).max()?;
        Some((first, last))
    }

    /// Distinct timestamps across every entity.
    pub fn timeline(&self) -> Timeline {
        let times: BTreeSet<i64> = self
            .series
            .values()
            .flat_map(|s| s.times.iter().copied())
            .collect();
        Timeline {
            times: times.into_iter().collect(),
        }
    }
}

// ── Timeline ────────────────────────────────────────────────────────

/// Sorted distinct timestamps across all entities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timeline {
    times: Vec<i64>,
}

impl Timeline {
    pub fn get(&self, idx: usize) -> Option<i64> {
        self.times.get(idx).copied()
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn bounds(&self) -> Option<(i64, i64)> {
        Some((*self.times.first()?, *self.times.last()?))
    }

    pub fn as_slice(&self) -> &[i64] {
        &self.times
    }
}
