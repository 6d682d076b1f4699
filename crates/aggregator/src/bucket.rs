//! Bucket arithmetic and merge-by-key

use serde::Serialize;
use std::collections::BTreeMap;
use storage::BucketAverage;

pub const HOUR_SECS: i64 = 3_600;
pub const DAY_SECS: i64 = 86_400;

/// Width of the trailing window used by the hourly series
pub const ROLLING_WINDOW_SECS: i64 = 86_400;

/// Bucket width for bucketed averages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketSize {
    Hour,
    Day,
}

impl BucketSize {
    pub fn secs(&self) -> i64 {
        match self {
            BucketSize::Hour => HOUR_SECS,
            BucketSize::Day => DAY_SECS,
        }
    }

    /// Inclusive `[start, start + width]` for the bucket containing `timestamp`.
    ///
    /// `None` when the bucket edge does not fit in an `i64`.
    pub fn bounds(&self, timestamp: i64) -> Option<(i64, i64)> {
        let start = bucket_start(timestamp, self.secs())?;
        Some((start, start.checked_add(self.secs())?))
    }
}

/// Floor `timestamp` to a multiple of `width`, `None` below `i64::MIN`
pub fn bucket_start(timestamp: i64, width: i64) -> Option<i64> {
    timestamp.div_euclid(width).checked_mul(width)
}

/// `floor((start + end) / 2)` without overflowing on extreme inputs
pub fn midpoint(start: i64, end: i64) -> i64 {
    (start as i128 + end as i128).div_euclid(2) as i64
}

/// Round half away from zero to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// One entry of an hourly series
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HourlyPoint {
    /// Bucket start, seconds since epoch
    pub bucket: i64,
    /// Bucket mean, rounded to two decimals
    pub value: f64,
}

impl From<BucketAverage> for HourlyPoint {
    fn from(avg: BucketAverage) -> Self {
        Self {
            bucket: avg.bucket,
            value: round2(avg.average),
        }
    }
}

/// One row of a two-series merge.
///
/// A side without data for the bucket reports `0.0` with its
/// `*_has_data` flag cleared; a real zero keeps the flag set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MergedBucket {
    pub bucket: i64,
    pub left: f64,
    pub right: f64,
    pub left_has_data: bool,
    pub right_has_data: bool,
}

/// Union of both key sets, ascending, missing values defaulted to zero
pub fn merge_by_bucket(left: &[HourlyPoint], right: &[HourlyPoint]) -> Vec<MergedBucket> {
    let mut merged: BTreeMap<i64, MergedBucket> = BTreeMap::new();

    for point in left {
        let entry = merged.entry(point.bucket).or_insert_with(|| empty(point.bucket));
        entry.left = point.value;
        entry.left_has_data = true;
    }
    for point in right {
        let entry = merged.entry(point.bucket).or_insert_with(|| empty(point.bucket));
        entry.right = point.value;
        entry.right_has_data = true;
    }

    merged.into_values().collect()
}

fn empty(bucket: i64) -> MergedBucket {
    MergedBucket {
        bucket,
        left: 0.0,
        right: 0.0,
        left_has_data: false,
        right_has_data: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_bounds() {
        assert_eq!(BucketSize::Hour.bounds(1000), Some((0, 3600)));
        assert_eq!(BucketSize::Hour.bounds(3700), Some((3600, 7200)));
        assert_eq!(BucketSize::Hour.bounds(3600), Some((3600, 7200)));
        assert_eq!(BucketSize::Day.bounds(90_000), Some((86_400, 172_800)));
    }

    #[test]
    fn test_bucket_bounds_at_i64_edges() {
        assert_eq!(BucketSize::Hour.bounds(i64::MAX), None);
        assert_eq!(BucketSize::Day.bounds(i64::MAX - 10), None);
        assert_eq!(BucketSize::Hour.bounds(i64::MIN), None);

        let last = i64::MAX.div_euclid(HOUR_SECS) * HOUR_SECS - HOUR_SECS;
        assert_eq!(BucketSize::Hour.bounds(last), Some((last, last + HOUR_SECS)));
    }

    #[test]
    fn test_bucket_start_floors_negative() {
        assert_eq!(bucket_start(-1, HOUR_SECS), Some(-3600));
        assert_eq!(bucket_start(7_199, HOUR_SECS), Some(3_600));
    }

    #[test]
    fn test_midpoint_floors() {
        assert_eq!(midpoint(0, 10), 5);
        assert_eq!(midpoint(0, 11), 5);
        assert_eq!(midpoint(-3, 0), -2);
        assert_eq!(midpoint(i64::MAX, i64::MAX), i64::MAX);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(12.345678), 12.35);
        assert_eq!(round2(10.0), 10.0);
        assert_eq!(round2(-1.004), -1.0);
    }

    #[test]
    fn test_merge_union_with_zero_default() {
        let left = vec![
            HourlyPoint { bucket: 0, value: 1.5 },
            HourlyPoint { bucket: 3600, value: 2.5 },
        ];
        let right = vec![
            HourlyPoint { bucket: 3600, value: 0.0 },
            HourlyPoint { bucket: 7200, value: 40.0 },
        ];

        let merged = merge_by_bucket(&left, &right);
        let keys: Vec<i64> = merged.iter().map(|m| m.bucket).collect();
        assert_eq!(keys, vec![0, 3600, 7200]);

        assert_eq!(merged[0].right, 0.0);
        assert!(!merged[0].right_has_data);
        assert!(merged[1].right_has_data);
        assert_eq!(merged[1].right, 0.0);
        assert_eq!(merged[2].left, 0.0);
        assert!(!merged[2].left_has_data);
    }

    #[test]
    fn test_merge_empty_inputs() {
        assert!(merge_by_bucket(&[], &[]).is_empty());
    }
}
