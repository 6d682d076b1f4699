//! Noise Routes

use aggregator::BucketSize;
use axum::{
    extract::State,
    Json,
};
use std::sync::Arc;
use storage::{Metric, NoiseField, Series, SeriesRow};

use super::{ApiQuery, BucketAverageResponse, FieldQuery, HourlySeriesResponse, RangeQuery};
use crate::error::{ApiError, Fetching};
use crate::AppState;

fn parse_field(params: &FieldQuery, what: &'static str) -> Result<NoiseField, ApiError> {
    match params.field.as_deref() {
        Some(name) => name.parse().map_err(|e| ApiError::invalid_column(what, e)),
        None => Ok(NoiseField::Laeq),
    }
}

/// Get the latest noise reading
pub async fn get_latest(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SeriesRow>, ApiError> {
    let row = state
        .aggregator
        .latest(Series::Noise)
        .await
        .fetching("latest noise data")?;
    Ok(Json(row))
}

/// Get the noise reading closest to the middle of a time range
pub async fn get_snapshot(
    State(state): State<Arc<AppState>>,
    ApiQuery(range): ApiQuery<RangeQuery>,
) -> Result<Json<SeriesRow>, ApiError> {
    let row = state
        .aggregator
        .nearest_to_midpoint(Series::Noise, range.start, range.end)
        .await
        .fetching("noise snapshot")?;
    Ok(Json(row))
}

/// Get the rolling 24 hour series of a noise field (default laeq)
pub async fn get_hourly(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<FieldQuery>,
) -> Result<Json<HourlySeriesResponse>, ApiError> {
    let field = parse_field(&params, "noise hourly series")?;
    let data = state
        .aggregator
        .rolling_hourly(Metric::Noise(field))
        .await
        .fetching("noise hourly series")?;
    Ok(Json(HourlySeriesResponse::new(field.column(), data)))
}

/// Get the hourly average of a noise field
pub async fn get_hourly_average(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<FieldQuery>,
) -> Result<Json<BucketAverageResponse>, ApiError> {
    bucket_average(&state, &params, BucketSize::Hour, "hourly noise average").await
}

/// Get the daily average of a noise field
pub async fn get_daily_average(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<FieldQuery>,
) -> Result<Json<BucketAverageResponse>, ApiError> {
    bucket_average(&state, &params, BucketSize::Day, "daily noise average").await
}

async fn bucket_average(
    state: &AppState,
    params: &FieldQuery,
    size: BucketSize,
    what: &'static str,
) -> Result<Json<BucketAverageResponse>, ApiError> {
    let field = parse_field(params, what)?;

    let avg = state
        .aggregator
        .bucketed_average(Metric::Noise(field), size, params.or_now())
        .await
        .fetching(what)?;
    Ok(Json(BucketAverageResponse::new(field.column(), avg)))
}
