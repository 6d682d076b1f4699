//! Environment Routes

use aggregator::BucketSize;
use axum::{
    extract::State,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storage::{EnvironmentField, Metric, Series, SeriesRow};

use super::{ApiQuery, HourlySeriesResponse, RangeQuery, TimestampQuery};
use crate::error::{ApiError, Fetching};
use crate::AppState;

const PM25: Metric = Metric::Environment(EnvironmentField::Pm25);

/// Hourly PM2.5 average in the shape the dashboard reads
#[derive(Debug, Serialize)]
pub struct HourlyPm25Response {
    pub avg_pm25: f64,
    pub count: i64,
    pub hour_start: i64,
    pub hour_end: i64,
}

/// Daily PM2.5 average in the shape the dashboard reads
#[derive(Debug, Serialize)]
pub struct DailyPm25Response {
    pub avg_pm25: f64,
    pub count: i64,
    pub day_start: i64,
    pub day_end: i64,
}

#[derive(Debug, Deserialize)]
pub struct EnvironmentHourlyQuery {
    /// Defaults to pm2_5
    pub field: Option<String>,
}

/// Get the latest environment reading
pub async fn get_latest(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SeriesRow>, ApiError> {
    let row = state
        .aggregator
        .latest(Series::Environment)
        .await
        .fetching("latest environment data")?;
    Ok(Json(row))
}

/// Get the reading closest to the middle of a time range
pub async fn get_snapshot(
    State(state): State<Arc<AppState>>,
    ApiQuery(range): ApiQuery<RangeQuery>,
) -> Result<Json<SeriesRow>, ApiError> {
    let row = state
        .aggregator
        .nearest_to_midpoint(Series::Environment, range.start, range.end)
        .await
        .fetching("environment snapshot")?;
    Ok(Json(row))
}

/// Get the PM2.5 average for the hour containing `timestamp`
pub async fn get_hourly_average_pm25(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<TimestampQuery>,
) -> Result<Json<HourlyPm25Response>, ApiError> {
    let avg = state
        .aggregator
        .bucketed_average(PM25, BucketSize::Hour, params.or_now())
        .await
        .fetching("hourly PM2.5 average")?;

    Ok(Json(HourlyPm25Response {
        avg_pm25: avg.average,
        count: avg.count,
        hour_start: avg.start,
        hour_end: avg.end,
    }))
}

/// Get the PM2.5 average for the day containing `timestamp`
pub async fn get_daily_average_pm25(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<TimestampQuery>,
) -> Result<Json<DailyPm25Response>, ApiError> {
    let avg = state
        .aggregator
        .bucketed_average(PM25, BucketSize::Day, params.or_now())
        .await
        .fetching("daily PM2.5 average")?;

    Ok(Json(DailyPm25Response {
        avg_pm25: avg.average,
        count: avg.count,
        day_start: avg.start,
        day_end: avg.end,
    }))
}

/// Get the rolling 24 hour series of an environment field
pub async fn get_hourly(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<EnvironmentHourlyQuery>,
) -> Result<Json<HourlySeriesResponse>, ApiError> {
    let field: EnvironmentField = match params.field.as_deref() {
        Some(name) => name
            .parse()
            .map_err(|e| ApiError::invalid_column("environment hourly series", e))?,
        None => EnvironmentField::Pm25,
    };

    let data = state
        .aggregator
        .rolling_hourly(Metric::Environment(field))
        .await
        .fetching("environment hourly series")?;

    Ok(Json(HourlySeriesResponse::new(field.column(), data)))
}
