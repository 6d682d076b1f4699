//! Time-series Aggregator
//!
//! Stateless query layer over the three series. Every operation is a pure
//! function of the store contents and its parameters, so callers may run
//! them in parallel and retry them freely.

use crate::bucket::{
    merge_by_bucket, midpoint, round2, BucketSize, HourlyPoint, MergedBucket, HOUR_SECS,
    ROLLING_WINDOW_SECS,
};
use crate::error::AggregateError;
use serde::Serialize;
use std::sync::Arc;
use storage::{Metric, Road, Series, SeriesRow, SeriesStore, StorageError};
use tracing::{debug, error};

/// Mean of one hour or day bucket
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BucketedAverage {
    /// Inclusive bucket start
    pub start: i64,
    /// Bucket start plus the bucket width
    pub end: i64,
    /// Rounded to two decimals
    pub average: f64,
    /// Rows with a non-null value that fed the mean
    pub count: i64,
}

/// Latest row of each series, `None` where a series is empty
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveSnapshot {
    pub environment: Option<SeriesRow>,
    pub traffic: Option<SeriesRow>,
    pub noise: Option<SeriesRow>,
}

/// Query-and-aggregation front end over an injected [`SeriesStore`]
#[derive(Clone)]
pub struct TimeSeriesAggregator {
    store: Arc<dyn SeriesStore>,
}

/// Log a store failure with the operation that hit it
fn storage_failure(operation: &str, subject: &str, err: StorageError) -> AggregateError {
    error!("{} on {} failed: {}", operation, subject, err);
    AggregateError::Storage(err)
}

impl TimeSeriesAggregator {
    pub fn new(store: Arc<dyn SeriesStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn SeriesStore> {
        &self.store
    }

    /// Row with the maximum timestamp
    pub async fn latest(&self, series: Series) -> Result<SeriesRow, AggregateError> {
        self.store
            .latest(series)
            .await
            .map_err(|e| storage_failure("latest", series.table(), e))?
            .ok_or_else(|| AggregateError::NotFound(series.to_string()))
    }

    /// Row in `[start, end]` closest to the floored midpoint of the range
    pub async fn nearest_to_midpoint(
        &self,
        series: Series,
        start: i64,
        end: i64,
    ) -> Result<SeriesRow, AggregateError> {
        if start > end {
            debug!("Empty range [{}, {}] for {}", start, end, series);
            return Err(AggregateError::NotFound(series.to_string()));
        }

        let target = midpoint(start, end);
        debug!("Nearest {} row to {} in [{}, {}]", series, target, start, end);

        self.store
            .nearest(series, start, end, target)
            .await
            .map_err(|e| storage_failure("nearest", series.table(), e))?
            .ok_or_else(|| AggregateError::NotFound(series.to_string()))
    }

    /// Mean of `metric` over the hour or day bucket containing `timestamp`
    pub async fn bucketed_average(
        &self,
        metric: Metric,
        size: BucketSize,
        timestamp: i64,
    ) -> Result<BucketedAverage, AggregateError> {
        if timestamp < 0 {
            return Err(AggregateError::InvalidArgument(format!(
                "timestamp must not be negative, got {}",
                timestamp
            )));
        }

        let (start, end) = size.bounds(timestamp).ok_or_else(|| {
            AggregateError::InvalidArgument(format!("timestamp {} is out of range", timestamp))
        })?;
        let range = self
            .store
            .range_average(metric, start, end)
            .await
            .map_err(|e| storage_failure("range_average", metric.label(), e))?;

        match range.average {
            Some(average) if range.count > 0 => Ok(BucketedAverage {
                start,
                end,
                average: round2(average),
                count: range.count,
            }),
            _ => Err(AggregateError::NotFound(metric.label().to_string())),
        }
    }

    /// Hourly means over the 24 hours ending at the newest row of the series.
    ///
    /// Hours without data are left out, so the result may hold fewer than
    /// 24 points. An empty series yields an empty result.
    pub async fn rolling_hourly(&self, metric: Metric) -> Result<Vec<HourlyPoint>, AggregateError> {
        let series = metric.series();
        let max_ts = match self.max_timestamp(series).await? {
            Some(ts) => ts,
            None => return Ok(Vec::new()),
        };

        self.hourly_between(metric, max_ts - ROLLING_WINDOW_SECS, max_ts)
            .await
    }

    /// Hourly means of two metrics over the trailing 24 hours both series
    /// have in common, joined on the hour bucket
    pub async fn merge_by_hour(
        &self,
        left: Metric,
        right: Metric,
    ) -> Result<Vec<MergedBucket>, AggregateError> {
        let left_max = self.max_timestamp(left.series()).await?;
        let right_max = self.max_timestamp(right.series()).await?;

        let common_max = match (left_max, right_max) {
            (Some(a), Some(b)) => a.min(b),
            _ => {
                debug!(
                    "Merge of {} and {} skipped, a series is empty",
                    left.label(),
                    right.label()
                );
                return Ok(Vec::new());
            }
        };
        let start = common_max - ROLLING_WINDOW_SECS;

        let left_points = self.hourly_between(left, start, common_max).await?;
        let right_points = self.hourly_between(right, start, common_max).await?;

        Ok(merge_by_bucket(&left_points, &right_points))
    }

    /// Rolling hourly series of a single road.
    ///
    /// `road` must name one of the nine monitored roads exactly; anything
    /// else is rejected before the store is touched.
    pub async fn road_hourly(&self, road: &str) -> Result<Vec<HourlyPoint>, AggregateError> {
        let road: Road = road.parse()?;
        self.rolling_hourly(Metric::Road(road)).await
    }

    /// Latest row of every series for the live feed
    pub async fn live_snapshot(&self) -> Result<LiveSnapshot, AggregateError> {
        Ok(LiveSnapshot {
            environment: self.latest_optional(Series::Environment).await?,
            traffic: self.latest_optional(Series::Traffic).await?,
            noise: self.latest_optional(Series::Noise).await?,
        })
    }

    async fn latest_optional(&self, series: Series) -> Result<Option<SeriesRow>, AggregateError> {
        match self.latest(series).await {
            Ok(row) => Ok(Some(row)),
            Err(AggregateError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn max_timestamp(&self, series: Series) -> Result<Option<i64>, AggregateError> {
        self.store
            .max_timestamp(series)
            .await
            .map_err(|e| storage_failure("max_timestamp", series.table(), e))
    }

    async fn hourly_between(
        &self,
        metric: Metric,
        start: i64,
        end: i64,
    ) -> Result<Vec<HourlyPoint>, AggregateError> {
        let buckets = self
            .store
            .bucket_averages(metric, HOUR_SECS, start, end)
            .await
            .map_err(|e| storage_failure("bucket_averages", metric.label(), e))?;

        debug!(
            "{} hourly buckets for {} in [{}, {}]",
            buckets.len(),
            metric.label(),
            start,
            end
        );
        Ok(buckets.into_iter().map(HourlyPoint::from).collect())
    }
}
