use persistence::EventLogError;
use thiserror::Error;
use types::errors::FeedError;

/// Why an ingestion cycle did not complete
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("A cycle is already in progress")]
    Busy,

    /// Fetch failed; nothing was written.
    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error("Event log error: {0}")]
    Log(#[from] EventLogError),
}
