//! Storage Layer
//!
//! Sample types for the environment, traffic and noise series, the
//! [`SeriesStore`] capability consumed by the aggregator, and two
//! implementations of it: SQLite via sqlx and an in-memory repository.

mod repository;
mod sample;
mod sqlite;
mod store;

pub use repository::MemoryStore;
pub use sample::{
    EnvironmentField, EnvironmentSample, Metric, NoiseField, NoiseSample, Road, Series,
    SeriesRow, TrafficSample, UnknownColumn,
};
pub use sqlite::SqliteStore;
pub use store::{BucketAverage, RangeAverage, SeriesStore};

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::DatabaseError(err.to_string())
    }
}
