//! Series Store Capability
//!
//! The aggregation layer never holds a connection of its own; it is handed
//! something implementing [`SeriesStore`] and issues every query through it.

use crate::sample::{Metric, Series, SeriesRow};
use crate::StorageError;
use async_trait::async_trait;
use serde::Serialize;

/// Mean and contributing row count over an inclusive range
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RangeAverage {
    /// `None` when no row in range had a non-null value
    pub average: Option<f64>,
    /// Rows with a non-null value for the metric
    pub count: i64,
}

/// Mean of one fixed-width bucket
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BucketAverage {
    /// Bucket start, seconds since epoch
    pub bucket: i64,
    pub average: f64,
    pub count: i64,
}

/// Read-side operations of the time-series store.
///
/// All ranges are inclusive on both ends. Implementations must be safe to
/// call from many tasks at once.
#[async_trait]
pub trait SeriesStore: Send + Sync {
    /// Largest timestamp in the series, `None` if it is empty
    async fn max_timestamp(&self, series: Series) -> Result<Option<i64>, StorageError>;

    /// A row carrying the largest timestamp
    async fn latest(&self, series: Series) -> Result<Option<SeriesRow>, StorageError>;

    /// Row in `[start, end]` closest to `target`, earliest written on ties
    async fn nearest(
        &self,
        series: Series,
        start: i64,
        end: i64,
        target: i64,
    ) -> Result<Option<SeriesRow>, StorageError>;

    /// Mean of `metric` over `[start, end]`
    async fn range_average(
        &self,
        metric: Metric,
        start: i64,
        end: i64,
    ) -> Result<RangeAverage, StorageError>;

    /// Means of `metric` grouped into `bucket_secs` wide buckets over
    /// `[start, end]`, ascending by bucket, buckets without data omitted
    async fn bucket_averages(
        &self,
        metric: Metric,
        bucket_secs: i64,
        start: i64,
        end: i64,
    ) -> Result<Vec<BucketAverage>, StorageError>;
}
