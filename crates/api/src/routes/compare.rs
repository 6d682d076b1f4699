//! Comparison Routes
//!
//! Two metrics joined on the hour bucket. A side without data for an hour
//! reports 0 together with `<name>_has_data: false`.

use aggregator::MergedBucket;
use axum::{extract::State, Json};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use storage::{EnvironmentField, Metric, NoiseField};

use crate::error::{ApiError, Fetching};
use crate::AppState;

const TRAFFIC: Metric = Metric::TrafficMean;
const NOISE: Metric = Metric::Noise(NoiseField::Laeq);
const PM25: Metric = Metric::Environment(EnvironmentField::Pm25);

/// Response for comparison endpoints
#[derive(Debug, Serialize)]
pub struct ComparisonResponse {
    pub metrics: [&'static str; 2],
    pub data: Vec<Map<String, Value>>,
    pub count: usize,
}

fn to_row(bucket: &MergedBucket, left: &str, right: &str) -> Map<String, Value> {
    let mut row = Map::new();
    row.insert("hour".to_string(), Value::from(bucket.bucket));
    row.insert(left.to_string(), Value::from(bucket.left));
    row.insert(right.to_string(), Value::from(bucket.right));
    row.insert(format!("{}_has_data", left), Value::from(bucket.left_has_data));
    row.insert(format!("{}_has_data", right), Value::from(bucket.right_has_data));
    row
}

async fn compare(
    state: &AppState,
    (left, left_name): (Metric, &'static str),
    (right, right_name): (Metric, &'static str),
    what: &'static str,
) -> Result<Json<ComparisonResponse>, ApiError> {
    let merged = state
        .aggregator
        .merge_by_hour(left, right)
        .await
        .fetching(what)?;

    let data: Vec<_> = merged
        .iter()
        .map(|bucket| to_row(bucket, left_name, right_name))
        .collect();

    Ok(Json(ComparisonResponse {
        metrics: [left_name, right_name],
        count: data.len(),
        data,
    }))
}

/// Hourly traffic against hourly LAeq
pub async fn traffic_vs_noise(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ComparisonResponse>, ApiError> {
    compare(&state, (TRAFFIC, "traffic"), (NOISE, "noise"), "traffic/noise comparison").await
}

/// Hourly traffic against hourly PM2.5
pub async fn traffic_vs_pm25(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ComparisonResponse>, ApiError> {
    compare(&state, (TRAFFIC, "traffic"), (PM25, "pm2_5"), "traffic/PM2.5 comparison").await
}

/// Hourly LAeq against hourly PM2.5
pub async fn noise_vs_pm25(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ComparisonResponse>, ApiError> {
    compare(&state, (NOISE, "noise"), (PM25, "pm2_5"), "noise/PM2.5 comparison").await
}
