//! Entity manifest: display names, partition keys and classification tags
//!
//! On disk the manifest is one JSON object keyed by entity id. Older exports
//! used `team`, `dir` and `class` for the three fields and carried a few
//! extra descriptive keys; both are still read, and unknown keys are kept so
//! that a rewrite does not lose them.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use types::ids::EntityId;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid manifest: {0}")]
    Parse(#[from] serde_json::Error),
}

// ── Entries ─────────────────────────────────────────────────────────

/// What is known about one entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    #[serde(default, alias = "team", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, alias = "dir", skip_serializing_if = "Option::is_none")]
    pub partition_key: Option<String>,
    #[serde(default, alias = "class", skip_serializing_if = "Option::is_none")]
    pub classification_tag: Option<String>,
    /// Samples in the entity's partition at export time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl ManifestEntry {
    /// Display name, falling back to the entity key.
    pub fn display_name<'a>(&'a self, key: &'a EntityId) -> &'a str {
        non_empty(&self.display_name).unwrap_or(key.as_str())
    }

    /// Partition key, falling back to the entity key.
    pub fn partition_key<'a>(&'a self, key: &'a EntityId) -> &'a str {
        non_empty(&self.partition_key).unwrap_or(key.as_str())
    }

    pub fn classification_tag(&self) -> Option<&str> {
        non_empty(&self.classification_tag)
    }
}

// ── Class Filter ────────────────────────────────────────────────────

/// Which entities take part in a view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ClassFilter {
    #[default]
    Any,
    /// Only entities whose tag equals this one, ignoring ASCII case.
    Only(String),
}

impl ClassFilter {
    pub fn from_option(tag: Option<String>) -> Self {
        match tag {
            Some(tag) if !tag.trim().is_empty() => ClassFilter::Only(tag.trim().to_string()),
            _ => ClassFilter::Any,
        }
    }

    pub fn matches(&self, tag: Option<&str>) -> bool {
        match self {
            ClassFilter::Any => true,
            ClassFilter::Only(wanted) => tag.is_some_and(|t| t.eq_ignore_ascii_case(wanted)),
        }
    }
}

// ── Manifest ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: BTreeMap<EntityId, ManifestEntry>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(text: &str) -> Result<Self, ManifestError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Write the manifest as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn insert(&mut self, entity_id: EntityId, entry: ManifestEntry) {
        self.entries.insert(entity_id, entry);
    }

    pub fn get(&self, entity_id: &EntityId) -> Option<&ManifestEntry> {
        self.entries.get(entity_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &ManifestEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries accepted by `filter`, in entity id order.
    pub fn select<'a>(
        &'a self,
        filter: &'a ClassFilter,
    ) -> impl Iterator<Item = (&'a EntityId, &'a ManifestEntry)> + 'a {
        self.entries
            .iter()
            .filter(move |(_, entry)| filter.matches(entry.classification_tag()))
    }

    /// Display name of an entity, when the manifest knows it.
    pub fn label(&self, entity_id: &EntityId) -> Option<String> {
        self.get(entity_id)
            .map(|entry| entry.display_name(entity_id).to_string())
    }
}
