//! Aggregation Error Types

use storage::{StorageError, UnknownColumn};
use thiserror::Error;

/// Errors surfaced by the time-series aggregator
#[derive(Debug, Error)]
pub enum AggregateError {
    /// The query ran but no qualifying rows exist
    #[error("No {0} data found")]
    NotFound(String),

    /// Rejected before any query was issued
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The store failed; details are logged where the failure happens
    #[error("Storage failure: {0}")]
    Storage(#[from] StorageError),
}

impl From<UnknownColumn> for AggregateError {
    fn from(err: UnknownColumn) -> Self {
        AggregateError::InvalidArgument(err.to_string())
    }
}
