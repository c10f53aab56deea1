//! Error types shared across the tracker
//!
//! Error taxonomy using thiserror. Only [`FeedError`] is fatal (to one
//! ingestion cycle); record and partition errors are skipped where they occur.

use thiserror::Error;

/// The feed could not be fetched; the cycle aborts before any write.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeedError {
    #[error("Feed unreachable at {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("Feed {url} answered HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Feed body unreadable from {url}: {reason}")]
    Body { url: String, reason: String },
}

/// Why a feed record was skipped
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MalformedRecord {
    #[error("Record has no name")]
    MissingName,

    #[error("Record has no coordinates")]
    MissingCoordinates,

    #[error("Invalid coordinates: {raw}")]
    InvalidCoordinates { raw: String },
}

/// One entity's series could not be loaded; the entity is left out.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PartitionLoadError {
    #[error("Partition {partition} not found")]
    NotFound { partition: String },

    #[error("Failed to read partition {partition}: {reason}")]
    Io { partition: String, reason: String },

    #[error("Failed to parse partition {partition}: {reason}")]
    Parse { partition: String, reason: String },

    #[error("Partition task failed: {reason}")]
    Task { reason: String },
}
