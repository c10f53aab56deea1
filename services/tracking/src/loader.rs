//! Partition Loader — concurrent per-entity series loading
//!
//! One task per manifest entry fetches and decodes that entity's series.
//! Loads are independent: a partition that is missing or unreadable is
//! logged and its entity is left out of the index, while the rest load.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use types::errors::PartitionLoadError;
use types::ids::EntityId;
use types::sample::SeriesPoint;

use crate::index::{TimeSeries, TimeSeriesIndex};
use crate::manifest::{ClassFilter, Manifest};

/// File holding one entity's series inside its partition directory.
pub const SERIES_FILE: &str = "timeseries.json";

/// Manifest file inside the partitions directory.
pub const MANIFEST_FILE: &str = "index.json";

/// Where per-entity series come from.
#[async_trait]
pub trait PartitionSource: Send + Sync {
    /// Load the raw series points stored under `partition_key`.
    async fn load(&self, partition_key: &str) -> Result<Vec<SeriesPoint>, PartitionLoadError>;
}

// ── Directory Source ────────────────────────────────────────────────

/// Reads `<root>/teams/<partition_key>/timeseries.json`.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding every partition and the manifest.
    pub fn teams_dir(&self) -> PathBuf {
        self.root.join("teams")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.teams_dir().join(MANIFEST_FILE)
    }

    pub fn series_path(&self, partition_key: &str) -> PathBuf {
        self.teams_dir().join(partition_key).join(SERIES_FILE)
    }
}

/// A partition key names exactly one directory below `teams/`.
fn is_plain_key(key: &str) -> bool {
    !key.is_empty()
        && key != "."
        && key != ".."
        && Path::new(key).components().count() == 1
        && !key.contains(['/', '\\'])
}

#[async_trait]
impl PartitionSource for DirectorySource {
    async fn load(&self, partition_key: &str) -> Result<Vec<SeriesPoint>, PartitionLoadError> {
        if !is_plain_key(partition_key) {
            return Err(PartitionLoadError::NotFound {
                partition: partition_key.to_string(),
            });
        }

        let path = self.series_path(partition_key);
        let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => PartitionLoadError::NotFound {
                partition: partition_key.to_string(),
            },
            _ => PartitionLoadError::Io {
                partition: partition_key.to_string(),
                reason: e.to_string(),
            },
        })?;

        decode_series(partition_key, &bytes)
    }
}

/// Decode a series file point by point.
///
/// Only a file that is not a JSON array fails; elements that are not point
/// objects are dropped.
pub fn decode_series(partition_key: &str, bytes: &[u8]) -> Result<Vec<SeriesPoint>, PartitionLoadError> {
    let values: Vec<serde_json::Value> =
        serde_json::from_slice(bytes).map_err(|e| PartitionLoadError::Parse {
            partition: partition_key.to_string(),
            reason: e.to_string(),
        })?;

    let total = values.len();
    let points: Vec<SeriesPoint> = values
        .into_iter()
        .filter_map(|value| serde_json::from_value(value).ok())
        .collect();
    if points.len() != total {
        debug!(
            partition = partition_key,
            dropped = total - points.len(),
            "Dropped malformed series elements"
        );
    }
    Ok(points)
}

// ── Fan-out Load ────────────────────────────────────────────────────

/// Result of a fan-out load.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub index: TimeSeriesIndex,
    /// Entities whose partition could not be loaded.
    pub failures: BTreeMap<EntityId, PartitionLoadError>,
    /// Entities that loaded but had no valid sample.
    pub empty: Vec<EntityId>,
}

/// Load every manifest entity accepted by `filter`, one task per entity.
pub async fn load_index<S>(source: Arc<S>, manifest: &Manifest, filter: &ClassFilter) -> LoadOutcome
where
    S: PartitionSource + 'static,
{
    let mut tasks = JoinSet::new();
    for (entity_id, entry) in manifest.select(filter) {
        let source = Arc::clone(&source);
        let entity_id = entity_id.clone();
        let partition_key = entry.partition_key(&entity_id).to_string();
        tasks.spawn(async move {
            let result = source.load(&partition_key).await;
            (entity_id, result)
        });
    }

    let mut outcome = LoadOutcome::default();
    while let Some(joined) = tasks.join_next().await {
        let (entity_id, result) = match joined {
            Ok(pair) => pair,
            Err(e) => {
                let error = PartitionLoadError::Task {
                    reason: e.to_string(),
                };
                warn!(%error, "Partition task failed");
                continue;
            }
        };

        match result {
            Ok(points) => match TimeSeries::from_points(entity_id.clone(), &points) {
                Some(series) => {
                    debug!(entity = %entity_id, samples = series.len(), "Partition loaded");
                    outcome.index.insert(series);
                }
                None => {
                    debug!(entity = %entity_id, "Partition has no valid samples");
                    outcome.empty.push(entity_id);
                }
            },
            Err(error) => {
                warn!(entity = %entity_id, %error, "Skipping partition");
                outcome.failures.insert(entity_id, error);
            }
        }
    }
    outcome.empty.sort();

    info!(
        entities = outcome.index.len(),
        samples = outcome.index.sample_count(),
        failed = outcome.failures.len(),
        "Index loaded"
    );
    outcome
}
