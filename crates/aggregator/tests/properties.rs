//! Property tests for the aggregation rules

use aggregator::{AggregateError, BucketSize, TimeSeriesAggregator, HOUR_SECS, ROLLING_WINDOW_SECS};
use async_trait::async_trait;
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use storage::{
    BucketAverage, EnvironmentField, EnvironmentSample, MemoryStore, Metric, NoiseField,
    NoiseSample, RangeAverage, Road, Series, SeriesRow, SeriesStore, StorageError, TrafficSample,
};

const PM25: Metric = Metric::Environment(EnvironmentField::Pm25);
const LAEQ: Metric = Metric::Noise(NoiseField::Laeq);

fn block_on<F: Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime")
        .block_on(future)
}

fn env(timestamp: i64, pm2_5: f64) -> EnvironmentSample {
    EnvironmentSample {
        timestamp,
        location: "Ongar".to_string(),
        pm2_5: Some(pm2_5),
        temperature: None,
        weather: None,
        wind_speed: None,
        rain: None,
    }
}

fn noise(timestamp: i64, laeq: f64) -> NoiseSample {
    NoiseSample {
        timestamp,
        datetime: String::new(),
        laeq,
        lafmax: laeq,
        la10: laeq,
        la90: laeq,
        lceq: laeq,
        lcfmax: laeq,
        lc10: laeq,
        lc90: laeq,
    }
}

/// Store that must never be reached
struct UntouchableStore;

#[async_trait]
impl SeriesStore for UntouchableStore {
    async fn max_timestamp(&self, _: Series) -> Result<Option<i64>, StorageError> {
        panic!("store touched")
    }
    async fn latest(&self, _: Series) -> Result<Option<SeriesRow>, StorageError> {
        panic!("store touched")
    }
    async fn nearest(&self, _: Series, _: i64, _: i64, _: i64) -> Result<Option<SeriesRow>, StorageError> {
        panic!("store touched")
    }
    async fn range_average(&self, _: Metric, _: i64, _: i64) -> Result<RangeAverage, StorageError> {
        panic!("store touched")
    }
    async fn bucket_averages(
        &self,
        _: Metric,
        _: i64,
        _: i64,
        _: i64,
    ) -> Result<Vec<BucketAverage>, StorageError> {
        panic!("store touched")
    }
}

fn samples() -> impl Strategy<Value = Vec<(i64, f64)>> {
    prop::collection::vec((0i64..300_000, 0.0f64..500.0), 1..40)
}

proptest! {
    #[test]
    fn latest_has_max_timestamp(rows in samples()) {
        let store = MemoryStore::new();
        for (ts, value) in &rows {
            store.insert_environment(env(*ts, *value)).unwrap();
        }
        let agg = TimeSeriesAggregator::new(Arc::new(store));

        let latest = block_on(agg.latest(Series::Environment)).unwrap();
        let max = rows.iter().map(|(ts, _)| *ts).max().unwrap();
        prop_assert_eq!(latest.timestamp(), max);
    }

    #[test]
    fn nearest_minimises_distance(
        rows in samples(),
        start in 0i64..300_000,
        len in 0i64..100_000,
    ) {
        let end = start + len;
        let store = MemoryStore::new();
        for (ts, value) in &rows {
            store.insert_noise(noise(*ts, *value)).unwrap();
        }
        let agg = TimeSeriesAggregator::new(Arc::new(store));
        let mid = (start + end).div_euclid(2);

        let in_range: Vec<i64> = rows
            .iter()
            .map(|(ts, _)| *ts)
            .filter(|ts| (start..=end).contains(ts))
            .collect();

        match block_on(agg.nearest_to_midpoint(Series::Noise, start, end)) {
            Ok(row) => {
                let found = row.timestamp();
                prop_assert!((start..=end).contains(&found));
                for other in &in_range {
                    prop_assert!((found - mid).abs() <= (other - mid).abs());
                }
            }
            Err(AggregateError::NotFound(_)) => prop_assert!(in_range.is_empty()),
            Err(other) => prop_assert!(false, "unexpected error {:?}", other),
        }
    }

    #[test]
    fn bucket_contains_timestamp(t in 0i64..4_000_000_000, value in 0.0f64..500.0) {
        let store = MemoryStore::new();
        store.insert_environment(env(t, value)).unwrap();
        let agg = TimeSeriesAggregator::new(Arc::new(store));

        for size in [BucketSize::Hour, BucketSize::Day] {
            let avg = block_on(agg.bucketed_average(PM25, size, t)).unwrap();
            prop_assert!(avg.start <= t && t < avg.end);
            prop_assert_eq!(avg.end - avg.start, size.secs());
            prop_assert_eq!(avg.count, 1);
        }
    }

    #[test]
    fn rolling_series_stays_in_window(rows in samples()) {
        let store = MemoryStore::new();
        for (ts, value) in &rows {
            store.insert_traffic(TrafficSample::uniform(*ts, *value)).unwrap();
        }
        let agg = TimeSeriesAggregator::new(Arc::new(store));
        let max_ts = rows.iter().map(|(ts, _)| *ts).max().unwrap();
        let window_start = max_ts - ROLLING_WINDOW_SECS;

        let points = block_on(agg.rolling_hourly(Metric::TrafficMean)).unwrap();
        prop_assert!(!points.is_empty());
        for pair in points.windows(2) {
            prop_assert!(pair[0].bucket < pair[1].bucket);
        }
        for point in &points {
            prop_assert_eq!(point.bucket % HOUR_SECS, 0);
            prop_assert!(point.bucket <= max_ts);
            prop_assert!(point.bucket + HOUR_SECS > window_start);
        }

        let expected: BTreeSet<i64> = rows
            .iter()
            .map(|(ts, _)| *ts)
            .filter(|ts| (window_start..=max_ts).contains(ts))
            .map(|ts| ts.div_euclid(HOUR_SECS) * HOUR_SECS)
            .collect();
        let actual: BTreeSet<i64> = points.iter().map(|p| p.bucket).collect();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn merge_is_union_with_zero_default(traffic in samples(), sound in samples()) {
        let store = Arc::new(MemoryStore::new());
        for (ts, value) in &traffic {
            store.insert_traffic(TrafficSample::uniform(*ts, *value)).unwrap();
        }
        for (ts, value) in &sound {
            store.insert_noise(noise(*ts, *value)).unwrap();
        }
        let agg = TimeSeriesAggregator::new(store);

        let merged = block_on(agg.merge_by_hour(Metric::TrafficMean, LAEQ)).unwrap();

        let traffic_max = traffic.iter().map(|(ts, _)| *ts).max().unwrap();
        let noise_max = sound.iter().map(|(ts, _)| *ts).max().unwrap();
        let common_max = traffic_max.min(noise_max);
        let start = common_max - ROLLING_WINDOW_SECS;
        let keys_of = |rows: &[(i64, f64)]| -> BTreeSet<i64> {
            rows.iter()
                .map(|(ts, _)| *ts)
                .filter(|ts| (start..=common_max).contains(ts))
                .map(|ts| ts.div_euclid(HOUR_SECS) * HOUR_SECS)
                .collect()
        };
        let left_keys = keys_of(&traffic[..]);
        let right_keys = keys_of(&sound[..]);

        let merged_keys: Vec<i64> = merged.iter().map(|m| m.bucket).collect();
        let union: Vec<i64> = left_keys.union(&right_keys).copied().collect();
        prop_assert_eq!(merged_keys, union);

        for row in &merged {
            prop_assert_eq!(row.left_has_data, left_keys.contains(&row.bucket));
            prop_assert_eq!(row.right_has_data, right_keys.contains(&row.bucket));
            if !row.left_has_data {
                prop_assert_eq!(row.left, 0.0);
            }
            if !row.right_has_data {
                prop_assert_eq!(row.right, 0.0);
            }
        }
    }

    #[test]
    fn unknown_road_never_reaches_store(name in "[a-z_ ;']{0,40}") {
        prop_assume!(Road::ALL.iter().all(|road| road.column() != name));
        let agg = TimeSeriesAggregator::new(Arc::new(UntouchableStore));

        let result = block_on(agg.road_hourly(&name));
        prop_assert!(matches!(result, Err(AggregateError::InvalidArgument(_))));
    }
}

#[test]
fn rolling_example_from_sparse_traffic() {
    let store = MemoryStore::new();
    store.insert_traffic(TrafficSample::uniform(5_000, 1.0)).unwrap();
    store.insert_traffic(TrafficSample::uniform(95_000, 2.0)).unwrap();
    store.insert_traffic(TrafficSample::uniform(100_000, 3.0)).unwrap();
    let agg = TimeSeriesAggregator::new(Arc::new(store));

    let points = block_on(agg.rolling_hourly(Metric::TrafficMean)).unwrap();
    let buckets: Vec<i64> = points.iter().map(|p| p.bucket).collect();
    assert_eq!(buckets, vec![93_600, 97_200]);
}

#[test]
fn drop_table_road_is_rejected() {
    let agg = TimeSeriesAggregator::new(Arc::new(UntouchableStore));
    let result = block_on(agg.road_hourly("drop_table_roads"));
    assert!(matches!(result, Err(AggregateError::InvalidArgument(_))));
}
