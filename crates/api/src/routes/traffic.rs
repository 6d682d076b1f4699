//! Traffic Routes

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use storage::{Metric, Series, SeriesRow};

use super::{ApiQuery, HourlySeriesResponse, RangeQuery};
use crate::error::{ApiError, Fetching};
use crate::AppState;

/// Get the latest traffic reading
pub async fn get_latest(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SeriesRow>, ApiError> {
    let row = state
        .aggregator
        .latest(Series::Traffic)
        .await
        .fetching("latest traffic data")?;
    Ok(Json(row))
}

/// Get the traffic reading closest to the middle of a time range
pub async fn get_snapshot(
    State(state): State<Arc<AppState>>,
    ApiQuery(range): ApiQuery<RangeQuery>,
) -> Result<Json<SeriesRow>, ApiError> {
    let row = state
        .aggregator
        .nearest_to_midpoint(Series::Traffic, range.start, range.end)
        .await
        .fetching("traffic snapshot")?;
    Ok(Json(row))
}

/// Get the rolling 24 hour series of the mean across all roads
pub async fn get_hourly(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HourlySeriesResponse>, ApiError> {
    let data = state
        .aggregator
        .rolling_hourly(Metric::TrafficMean)
        .await
        .fetching("traffic hourly series")?;
    Ok(Json(HourlySeriesResponse::new(Metric::TrafficMean.label(), data)))
}

/// Get the rolling 24 hour series of one road
pub async fn get_road_hourly(
    State(state): State<Arc<AppState>>,
    Path(road): Path<String>,
) -> Result<Json<HourlySeriesResponse>, ApiError> {
    let data = state
        .aggregator
        .road_hourly(&road)
        .await
        .fetching("road hourly series")?;
    Ok(Json(HourlySeriesResponse::new(road, data)))
}
