use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde_json::Value;
use tower::ServiceExt;

use sky_metrics::{
    api::{create_router, AppState},
    models::{BucketUnit, Metric, MetricAverage, MetricType},
    query::MetricQueryEngine,
    store::{DuckDbStore, MemoryStore, MetricBackend, TimeRange},
    Result,
};

// 2017-08-02T15:00:00Z
const T: i64 = 1_501_686_000;

fn at(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0).unwrap()
}

fn samples() -> Vec<Metric> {
    (0..5)
        .map(|i| Metric {
            timestamp: at(T - i * 60),
            cpu_load: Some(40.0 + 5.0 * i as f64),
            concurrency: Some(1000 + i),
        })
        .collect()
}

fn router_for(backend: Arc<dyn MetricBackend>) -> Router {
    let engine = MetricQueryEngine::new(backend);
    create_router(AppState::new(engine), Duration::from_secs(15))
}

async fn get(app: Router, uri: &str) -> (StatusCode, Option<String>, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, content_type, body)
}

/// Backend whose range scans take far longer than any request budget used here.
struct StalledBackend;

#[async_trait]
impl MetricBackend for StalledBackend {
    async fn ensure_schema_ready(&self) -> Result<()> {
        Ok(())
    }

    async fn range_query(&self, _range: TimeRange, _metric_type: MetricType) -> Result<Vec<Metric>> {
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok(samples())
    }

    async fn bucketed_aggregate(
        &self,
        _range: TimeRange,
        _unit: BucketUnit,
        _metric_type: MetricType,
    ) -> Result<Vec<Metric>> {
        Ok(Vec::new())
    }

    async fn whole_range_aggregate(
        &self,
        _range: TimeRange,
        _metric_type: MetricType,
    ) -> Result<Vec<MetricAverage>> {
        Ok(Vec::new())
    }
}

/// Backend that only counts the calls it receives.
#[derive(Default)]
struct CountingBackend {
    calls: AtomicUsize,
}

#[async_trait]
impl MetricBackend for CountingBackend {
    async fn ensure_schema_ready(&self) -> Result<()> {
        Ok(())
    }

    async fn range_query(&self, _range: TimeRange, _metric_type: MetricType) -> Result<Vec<Metric>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }

    async fn bucketed_aggregate(
        &self,
        _range: TimeRange,
        _unit: BucketUnit,
        _metric_type: MetricType,
    ) -> Result<Vec<Metric>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }

    async fn whole_range_aggregate(
        &self,
        _range: TimeRange,
        _metric_type: MetricType,
    ) -> Result<Vec<MetricAverage>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_series_on_empty_store_is_not_found() {
    let app = router_for(Arc::new(MemoryStore::new()));

    let uri = format!("/metrics/cpu_load?start={}&end={}&frequency=minutes", T - 60, T);
    let (status, content_type, body) = get(app, &uri).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(content_type.as_deref(), Some("application/json"));
    let message = body["message"].as_str().unwrap();
    assert!(message.starts_with("data for specified filter does not exist"), "{}", message);
}

#[tokio::test]
async fn test_series_returns_ordered_projected_rows() {
    let app = router_for(Arc::new(MemoryStore::with_samples(samples())));

    let uri = format!("/metrics/cpu_load?start={}&end={}&frequency=minutes", T - 6 * 60, T);
    let (status, content_type, body) = get(app, &uri).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/json"));

    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[0]["timestamp"], "2017-08-02T14:56:00Z");
    assert_eq!(rows[4]["timestamp"], "2017-08-02T15:00:00Z");
    assert!(rows.iter().all(|r| r.get("cpu_load").is_some() && r.get("concurrency").is_none()));
}

#[tokio::test]
async fn test_untyped_series_carries_both_fields() {
    let app = router_for(Arc::new(MemoryStore::with_samples(samples())));

    let uri = format!("/metrics?start={}&end={}", T - 6 * 60, T);
    let (status, _, body) = get(app, &uri).await;

    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert!(rows.iter().all(|r| r.get("cpu_load").is_some() && r.get("concurrency").is_some()));
}

#[tokio::test]
async fn test_average_route_is_not_taken_for_a_type() {
    let app = router_for(Arc::new(MemoryStore::with_samples(samples())));

    let uri = format!("/metrics/average?start={}&end={}", T - 3600, T);
    let (status, _, body) = get(app, &uri).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["start"], "2017-08-02T14:00:00Z");
    assert_eq!(body["end"], "2017-08-02T15:00:00Z");
    assert_eq!(body["cpu_load"], 50.0);
    assert_eq!(body["concurrency"], 1002.0);
}

#[tokio::test]
async fn test_typed_average_omits_other_field() {
    let app = router_for(Arc::new(MemoryStore::with_samples(samples())));

    let uri = format!("/metrics/concurrency/average?start={}&end={}", T - 3600, T);
    let (status, _, body) = get(app, &uri).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["concurrency"], 1002.0);
    assert!(body.get("cpu_load").is_none());
}

#[tokio::test]
async fn test_average_over_empty_range_is_not_found() {
    let app = router_for(Arc::new(MemoryStore::with_samples(samples())));

    let (status, _, body) = get(app, "/metrics/average?start=0&end=60").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn test_invalid_input_never_reaches_store() {
    let backend = Arc::new(CountingBackend::default());
    let app = router_for(backend.clone());

    let cases = [
        ("/metrics?frequency=hours", "timerange wasn't specified"),
        (
            "/metrics?start=abc&end=10",
            "start timestamp is not valid; expected to be epoch format, but received abc",
        ),
        ("/metrics?start=0&end=10&frequency=weeks", "frequency value is not valid; received weeks"),
        ("/metrics/memory/average?start=0&end=10", "metric type is not valid; received memory"),
    ];

    for (uri, expected) in cases {
        let (status, _, body) = get(app.clone(), uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body["message"], expected);
    }

    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_duckdb_hourly_series_end_to_end() {
    let store = DuckDbStore::open_in_memory("metrics").unwrap();
    store.ensure_schema_ready().await.unwrap();
    store
        .insert_metrics(vec![
            Metric { timestamp: at(T - 50 * 60), cpu_load: Some(10.0), concurrency: Some(100) },
            Metric { timestamp: at(T - 20 * 60), cpu_load: Some(30.0), concurrency: Some(300) },
        ])
        .await
        .unwrap();
    let app = router_for(Arc::new(store));

    let uri = format!("/metrics/concurrency?start={}&end={}&frequency=hours", T - 3600, T - 1);
    let (status, _, body) = get(app, &uri).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        serde_json::json!([{"timestamp": "2017-08-02T14:00:00Z", "concurrency": 200}])
    );
}

#[tokio::test]
async fn test_telemetry_is_exposed() {
    let app = router_for(Arc::new(MemoryStore::with_samples(samples())));
    let uri = format!("/metrics?start={}&end={}", T - 60, T);
    let (status, _, _) = get(app.clone(), &uri).await;
    assert_eq!(status, StatusCode::OK);

    let response = app
        .oneshot(Request::builder().uri("/internal/telemetry").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("sky_queries_total"));
}

#[tokio::test]
async fn test_unknown_routes_answer_with_json_not_found() {
    let backend = Arc::new(CountingBackend::default());
    let app = router_for(backend.clone());

    for uri in ["/nope", "/metrics/cpu_load/extra?start=0&end=1"] {
        let (status, content_type, body) = get(app.clone(), uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
        assert_eq!(content_type.as_deref(), Some("application/json"), "{}", uri);
        let message = body["message"].as_str().unwrap();
        assert!(message.starts_with("no route for /"), "{}", message);
    }

    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_wrong_method_answers_with_json() {
    let app = router_for(Arc::new(MemoryStore::new()));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/metrics?start=0&end=1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["message"], "method POST is not allowed on this path");
}

#[tokio::test]
async fn test_slow_request_times_out_with_json() {
    let engine = MetricQueryEngine::new(Arc::new(StalledBackend));
    let app = create_router(AppState::new(engine), Duration::from_millis(20));

    let (status, content_type, body) = get(app, "/metrics?start=0&end=1").await;

    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    assert_eq!(content_type.as_deref(), Some("application/json"));
    assert_eq!(body["message"], "request did not complete within 20ms");
}
