//! API Error Mapping

use aggregator::AggregateError;
use axum::{
    extract::rejection::QueryRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use storage::UnknownColumn;
use thiserror::Error;
use tracing::warn;

/// Aggregator failure tagged with what the request was fetching
#[derive(Debug, Error)]
#[error("{what}: {source}")]
pub struct ApiError {
    what: &'static str,
    #[source]
    source: AggregateError,
}

impl ApiError {
    pub fn new(what: &'static str, source: AggregateError) -> Self {
        Self { what, source }
    }

    pub fn invalid_column(what: &'static str, err: UnknownColumn) -> Self {
        Self::new(what, AggregateError::from(err))
    }

    pub fn status(&self) -> StatusCode {
        match self.source {
            AggregateError::NotFound(_) => StatusCode::NOT_FOUND,
            AggregateError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            AggregateError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::new(
            "query parameters",
            AggregateError::InvalidArgument(rejection.body_text()),
        )
    }
}

/// Attach a description of the requested resource to an aggregator result
pub trait Fetching<T> {
    fn fetching(self, what: &'static str) -> Result<T, ApiError>;
}

impl<T> Fetching<T> for Result<T, AggregateError> {
    fn fetching(self, what: &'static str) -> Result<T, ApiError> {
        self.map_err(|source| ApiError::new(what, source))
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (kind, message) = match &self.source {
            AggregateError::NotFound(series) => ("not_found", format!("No {} data found", series)),
            AggregateError::InvalidArgument(msg) => ("invalid_argument", msg.clone()),
            // Storage details stay in the logs
            AggregateError::Storage(_) => ("storage", format!("Failed to fetch {}", self.what)),
        };

        if status.is_server_error() {
            warn!("Request for {} failed: {}", self.what, self.source);
        }
        metrics::counter!("api_errors_total", "kind" => kind).increment(1);

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
