//! Route handlers

pub mod compare;
pub mod environment;
pub mod live;
pub mod noise;
pub mod traffic;

use aggregator::{BucketedAverage, HourlyPoint};
use axum::{
    async_trait,
    extract::{FromRequestParts, Query},
    http::request::Parts,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::ApiError;

/// `Query` whose rejection renders as the JSON error body
#[derive(Debug)]
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Inclusive time range for snapshot lookups
#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub start: i64,
    pub end: i64,
}

/// Point in time selecting an hour or day bucket, defaults to now
#[derive(Debug, Deserialize)]
pub struct TimestampQuery {
    pub timestamp: Option<i64>,
}

impl TimestampQuery {
    pub fn or_now(&self) -> i64 {
        self.timestamp.unwrap_or_else(now)
    }
}

/// Optional column selector plus optional bucket timestamp
#[derive(Debug, Deserialize)]
pub struct FieldQuery {
    pub field: Option<String>,
    pub timestamp: Option<i64>,
}

impl FieldQuery {
    pub fn or_now(&self) -> i64 {
        self.timestamp.unwrap_or_else(now)
    }
}

/// Response for rolling hourly series
#[derive(Debug, Serialize)]
pub struct HourlySeriesResponse {
    pub metric: String,
    pub data: Vec<HourlyPoint>,
    pub count: usize,
}

impl HourlySeriesResponse {
    pub fn new(metric: impl Into<String>, data: Vec<HourlyPoint>) -> Self {
        Self {
            metric: metric.into(),
            count: data.len(),
            data,
        }
    }
}

/// Response for a single bucket average of an arbitrary field
#[derive(Debug, Serialize)]
pub struct BucketAverageResponse {
    pub field: &'static str,
    pub average: f64,
    pub count: i64,
    pub start: i64,
    pub end: i64,
}

impl BucketAverageResponse {
    pub fn new(field: &'static str, avg: BucketedAverage) -> Self {
        Self {
            field,
            average: avg.average,
            count: avg.count,
            start: avg.start,
            end: avg.end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_defaults_to_now() {
        let explicit = FieldQuery {
            field: None,
            timestamp: Some(3_600),
        };
        assert_eq!(explicit.or_now(), 3_600);

        let before = now();
        let defaulted = FieldQuery {
            field: Some("laeq".to_string()),
            timestamp: None,
        };
        assert!(defaulted.or_now() >= before);
        assert!(TimestampQuery { timestamp: None }.or_now() >= before);
    }
}
