//! In-memory Repository
//!
//! Holds the three series in plain vectors in write order. Used by tests
//! and by the server when no database URL is configured.

use crate::sample::{EnvironmentSample, Metric, NoiseSample, Series, SeriesRow, TrafficSample};
use crate::store::{BucketAverage, RangeAverage, SeriesStore};
use crate::StorageError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Series store kept entirely in process memory
pub struct MemoryStore {
    environment: Mutex<Vec<EnvironmentSample>>,
    traffic: Mutex<Vec<TrafficSample>>,
    noise: Mutex<Vec<NoiseSample>>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    mutex
        .lock()
        .map_err(|e| StorageError::Unavailable(format!("Lock error: {}", e)))
}

fn check_timestamp(series: Series, timestamp: i64) -> Result<(), StorageError> {
    if timestamp < 0 {
        return Err(StorageError::InvalidRecord(format!(
            "{} sample has negative timestamp {}",
            series, timestamp
        )));
    }
    Ok(())
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        info!("Creating in-memory series store");
        Self {
            environment: Mutex::new(Vec::new()),
            traffic: Mutex::new(Vec::new()),
            noise: Mutex::new(Vec::new()),
        }
    }

    pub fn insert_environment(&self, sample: EnvironmentSample) -> Result<(), StorageError> {
        check_timestamp(Series::Environment, sample.timestamp)?;
        lock(&self.environment)?.push(sample);
        Ok(())
    }

    pub fn insert_traffic(&self, sample: TrafficSample) -> Result<(), StorageError> {
        check_timestamp(Series::Traffic, sample.timestamp)?;
        lock(&self.traffic)?.push(sample);
        Ok(())
    }

    pub fn insert_noise(&self, sample: NoiseSample) -> Result<(), StorageError> {
        check_timestamp(Series::Noise, sample.timestamp)?;
        lock(&self.noise)?.push(sample);
        Ok(())
    }

    /// Number of stored rows in a series
    pub fn count(&self, series: Series) -> usize {
        match series {
            Series::Environment => self.environment.lock().map(|v| v.len()).unwrap_or(0),
            Series::Traffic => self.traffic.lock().map(|v| v.len()).unwrap_or(0),
            Series::Noise => self.noise.lock().map(|v| v.len()).unwrap_or(0),
        }
    }

    /// Snapshot of a series in write order
    fn rows(&self, series: Series) -> Result<Vec<SeriesRow>, StorageError> {
        let rows = match series {
            Series::Environment => lock(&self.environment)?
                .iter()
                .cloned()
                .map(SeriesRow::Environment)
                .collect(),
            Series::Traffic => lock(&self.traffic)?
                .iter()
                .cloned()
                .map(SeriesRow::Traffic)
                .collect(),
            Series::Noise => lock(&self.noise)?
                .iter()
                .cloned()
                .map(SeriesRow::Noise)
                .collect(),
        };
        Ok(rows)
    }

    /// `(timestamp, value)` pairs of a metric in `[start, end]`, nulls dropped
    fn values_in(&self, metric: Metric, start: i64, end: i64) -> Result<Vec<(i64, f64)>, StorageError> {
        Ok(self
            .rows(metric.series())?
            .iter()
            .filter(|row| (start..=end).contains(&row.timestamp()))
            .filter_map(|row| metric.value_of(row).map(|v| (row.timestamp(), v)))
            .collect())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SeriesStore for MemoryStore {
    async fn max_timestamp(&self, series: Series) -> Result<Option<i64>, StorageError> {
        Ok(self.rows(series)?.iter().map(SeriesRow::timestamp).max())
    }

    async fn latest(&self, series: Series) -> Result<Option<SeriesRow>, StorageError> {
        // max_by_key keeps the last maximum, i.e. the most recently written
        Ok(self.rows(series)?.into_iter().max_by_key(SeriesRow::timestamp))
    }

    async fn nearest(
        &self,
        series: Series,
        start: i64,
        end: i64,
        target: i64,
    ) -> Result<Option<SeriesRow>, StorageError> {
        // min_by_key keeps the first minimum, i.e. the earliest written
        Ok(self
            .rows(series)?
            .into_iter()
            .filter(|row| (start..=end).contains(&row.timestamp()))
            .min_by_key(|row| row.timestamp().abs_diff(target)))
    }

    async fn range_average(
        &self,
        metric: Metric,
        start: i64,
        end: i64,
    ) -> Result<RangeAverage, StorageError> {
        let values = self.values_in(metric, start, end)?;
        let count = values.len() as i64;
        let average = if values.is_empty() {
            None
        } else {
            Some(values.iter().map(|(_, v)| v).sum::<f64>() / values.len() as f64)
        };
        Ok(RangeAverage { average, count })
    }

    async fn bucket_averages(
        &self,
        metric: Metric,
        bucket_secs: i64,
        start: i64,
        end: i64,
    ) -> Result<Vec<BucketAverage>, StorageError> {
        if bucket_secs <= 0 {
            return Err(StorageError::InvalidRecord(format!(
                "bucket width must be positive, got {}",
                bucket_secs
            )));
        }

        let mut sums: BTreeMap<i64, (f64, i64)> = BTreeMap::new();
        for (timestamp, value) in self.values_in(metric, start, end)? {
            let bucket = timestamp.div_euclid(bucket_secs) * bucket_secs;
            let entry = sums.entry(bucket).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }

        debug!("{} buckets for {} in [{}, {}]", sums.len(), metric.label(), start, end);

        Ok(sums
            .into_iter()
            .map(|(bucket, (sum, count))| BucketAverage {
                bucket,
                average: sum / count as f64,
                count,
            })
            .collect())
    }
}
