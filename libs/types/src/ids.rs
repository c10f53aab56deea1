//! Identifier types for tracked entities and ingestion cycles
//!
//! Entities are keyed by the stable name the feed reports for them. Ingestion
//! cycles use UUID v7 so that cycle ids sort chronologically in the logs.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable key of a tracked entity (a race team)
///
/// Always non-empty and free of surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId(String);

impl EntityId {
    /// Create a new EntityId from a string
    ///
    /// # Panics
    /// Panics if the key is empty after trimming
    pub fn new(key: impl Into<String>) -> Self {
        match Self::try_new(key) {
            Some(id) => id,
            None => panic!("EntityId must not be empty"),
        }
    }

    /// Try to create an EntityId, returning None if the trimmed key is empty
    pub fn try_new(key: impl Into<String>) -> Option<Self> {
        let key = key.into();
        let trimmed = key.trim();
        if trimmed.is_empty() {
            None
        } else if trimmed.len() == key.len() {
            Some(Self(key))
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Get the key string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for EntityId {
    type Error = String;

    fn try_from(key: String) -> Result<Self, Self::Error> {
        Self::try_new(key).ok_or_else(|| "entity id must not be empty".to_string())
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Correlation id of one ingestion cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CycleId(Uuid);

impl CycleId {
    /// Create a new CycleId with current timestamp
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CycleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CycleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_trims_whitespace() {
        let id = EntityId::new("  Top Dutch \n");
        assert_eq!(id.as_str(), "Top Dutch");
    }

    #[test]
    fn test_entity_id_try_new() {
        assert!(EntityId::try_new("Agoria").is_some());
        assert!(EntityId::try_new("").is_none());
        assert!(EntityId::try_new(" \t ").is_none());
    }

    #[test]
    #[should_panic(expected = "EntityId must not be empty")]
    fn test_entity_id_empty_panics() {
        EntityId::new("   ");
    }

    #[test]
    fn test_entity_id_serialization() {
        let id = EntityId::new("Brunel");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"Brunel\"");

        let deserialized: EntityId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, deserialized);
    }

    #[test]
    fn test_entity_id_rejects_empty_json() {
        let result: Result<EntityId, _> = serde_json::from_str("\"  \"");
        assert!(result.is_err());
    }

    #[test]
    fn test_entity_id_ordering_is_lexical() {
        let mut ids = vec![EntityId::new("b"), EntityId::new("a"), EntityId::new("c")];
        ids.sort();
        let keys: Vec<&str> = ids.iter().map(EntityId::as_str).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_cycle_id_creation() {
        let id1 = CycleId::new();
        let id2 = CycleId::new();
        assert_ne!(id1, id2, "CycleIds should be unique");
    }
}
