use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("timerange wasn't specified")]
    MissingTimeRange,

    #[error("{field} timestamp is not valid; expected to be epoch format, but received {value}")]
    InvalidTimestamp { field: &'static str, value: String },

    #[error("frequency value is not valid; received {0}")]
    InvalidFrequency(String),

    #[error("metric type is not valid; received {0}")]
    InvalidMetricType(String),

    #[error("error while retrieving data: {0}")]
    Store(String),

    #[error("only one aggregation is expected, but the store returned {rows}")]
    InconsistentAggregate { rows: usize },

    #[error("aggregation exceeded its time budget of {0:?}")]
    QueryTimeout(Duration),

    #[error("{0}")]
    NotFound(String),

    #[error("method {0} is not allowed on this path")]
    MethodNotAllowed(String),

    #[error("request did not complete within {0:?}")]
    RequestTimeout(Duration),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MetricsError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            MetricsError::MissingTimeRange
            | MetricsError::InvalidTimestamp { .. }
            | MetricsError::InvalidFrequency(_)
            | MetricsError::InvalidMetricType(_) => StatusCode::BAD_REQUEST,
            MetricsError::NotFound(_) => StatusCode::NOT_FOUND,
            MetricsError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            MetricsError::RequestTimeout(_) => StatusCode::REQUEST_TIMEOUT,
            MetricsError::Store(_)
            | MetricsError::InconsistentAggregate { .. }
            | MetricsError::QueryTimeout(_)
            | MetricsError::Config(_)
            | MetricsError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<duckdb::Error> for MetricsError {
    fn from(err: duckdb::Error) -> Self {
        MetricsError::Store(err.to_string())
    }
}

impl From<tokio::task::JoinError> for MetricsError {
    fn from(err: tokio::task::JoinError) -> Self {
        MetricsError::Internal(format!("store task failed: {}", err))
    }
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let body = Json(json!({
            "message": self.to_string()
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, MetricsError>;
