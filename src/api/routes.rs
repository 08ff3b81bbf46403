use std::time::Duration;

use axum::{
    error_handling::HandleErrorLayer,
    extract::{Path, Query as QueryString, State},
    http::{header, Method, Uri},
    response::IntoResponse,
    routing::get,
    BoxError, Json, Router,
};
use tower::{timeout::TimeoutLayer, ServiceBuilder};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    models::{Metric, MetricAverage, Query},
    query::{build_query, MetricQueryEngine, QueryParams},
    telemetry, MetricsError, Result,
};

#[derive(Clone)]
pub struct AppState {
    pub engine: MetricQueryEngine,
}

impl AppState {
    pub fn new(engine: MetricQueryEngine) -> Self {
        Self { engine }
    }
}

/// Builds the HTTP router.
///
/// `/metrics` and `/metrics/average` cover every metric type; the `:metric_type`
/// variants scope the lookup to one of them. Unknown paths, wrong methods and
/// requests running past `request_timeout` answer with the same JSON error
/// body as the handlers.
pub fn create_router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/metrics", get(get_series))
        .route("/metrics/average", get(get_average))
        .route("/metrics/:metric_type", get(get_typed_series))
        .route("/metrics/:metric_type/average", get(get_typed_average))
        .route("/internal/telemetry", get(get_telemetry))
        .method_not_allowed_fallback(method_not_allowed)
        .fallback(route_not_found)
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(move |err: BoxError| async move {
                    middleware_error(err, request_timeout)
                }))
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn route_not_found(uri: Uri) -> MetricsError {
    MetricsError::NotFound(format!("no route for {}", uri.path()))
}

async fn method_not_allowed(method: Method) -> MetricsError {
    MetricsError::MethodNotAllowed(method.to_string())
}

fn middleware_error(err: BoxError, request_timeout: Duration) -> MetricsError {
    if err.is::<tower::timeout::error::Elapsed>() {
        warn!("Request exceeded {:?}", request_timeout);
        MetricsError::RequestTimeout(request_timeout)
    } else {
        MetricsError::Internal(err.to_string())
    }
}

async fn get_series(
    State(state): State<AppState>,
    QueryString(params): QueryString<QueryParams>,
) -> Result<Json<Vec<Metric>>> {
    series(&state, &params, None).await
}

async fn get_typed_series(
    State(state): State<AppState>,
    Path(metric_type): Path<String>,
    QueryString(params): QueryString<QueryParams>,
) -> Result<Json<Vec<Metric>>> {
    series(&state, &params, Some(metric_type.as_str())).await
}

async fn get_average(
    State(state): State<AppState>,
    QueryString(params): QueryString<QueryParams>,
) -> Result<Json<MetricAverage>> {
    average(&state, &params, None).await
}

async fn get_typed_average(
    State(state): State<AppState>,
    Path(metric_type): Path<String>,
    QueryString(params): QueryString<QueryParams>,
) -> Result<Json<MetricAverage>> {
    average(&state, &params, Some(metric_type.as_str())).await
}

async fn get_telemetry() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        telemetry::render(),
    )
}

async fn series(
    state: &AppState,
    params: &QueryParams,
    metric_type: Option<&str>,
) -> Result<Json<Vec<Metric>>> {
    let query = build_query(params, metric_type)?;
    info!("Getting series for {}", query);

    let series = state.engine.get_series(&query).await?;
    if series.is_empty() {
        return Err(not_found(&query));
    }
    Ok(Json(series))
}

async fn average(
    state: &AppState,
    params: &QueryParams,
    metric_type: Option<&str>,
) -> Result<Json<MetricAverage>> {
    let query = build_query(params, metric_type)?;
    info!("Getting average for {}", query);

    state
        .engine
        .get_average(&query)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(&query))
}

fn not_found(query: &Query) -> MetricsError {
    MetricsError::NotFound(format!(
        "data for specified filter does not exist; filter: {}",
        query
    ))
}
