//! Types library for the race telemetry tracker
//!
//! This library provides the core type definitions shared by the ingestion
//! logger, the event log and the query layer.
//!
//! # Modules
//! - `ids`: Identifiers (EntityId, CycleId)
//! - `sample`: Positions, feed points, samples and persisted rows
//! - `time`: Timestamp encodings and UTC helpers
//! - `errors`: Error taxonomy

// Public modules
pub mod ids;
pub mod sample;
pub mod time;
pub mod errors;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::ids::*;
    pub use crate::sample::*;
    pub use crate::time::*;
    pub use crate::errors::*;
}
