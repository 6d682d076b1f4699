//! Time-series Aggregation
//!
//! Latest-value and nearest-to-midpoint lookups, hour/day bucketed
//! averages, rolling 24 hour series and cross-series merges over the
//! environment, traffic and noise series.

mod aggregator;
mod bucket;
mod error;

pub use aggregator::{BucketedAverage, LiveSnapshot, TimeSeriesAggregator};
pub use bucket::{
    bucket_start, merge_by_bucket, midpoint, round2, BucketSize, HourlyPoint, MergedBucket,
    DAY_SECS, HOUR_SECS, ROLLING_WINDOW_SECS,
};
pub use error::AggregateError;
