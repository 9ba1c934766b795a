//! HTTP API for health checks, Prometheus metrics and read-only queries

use aiops_lib::{
    analytics::PerformanceAnalyzer,
    health::{ComponentStatus, HealthRegistry},
    query::QueryService,
    AiopsError, MetricKind, Store,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

/// Shared application state
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub queries: QueryService,
    pub analytics: PerformanceAnalyzer,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, store: Arc<dyn Store>) -> Self {
        Self {
            health_registry,
            queries: QueryService::new(store.clone()),
            analytics: PerformanceAnalyzer::new(store),
        }
    }
}

/// Library errors rendered as JSON with a matching status code
struct ApiError(AiopsError);

impl From<AiopsError> for ApiError {
    fn from(err: AiopsError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            AiopsError::NotFound { .. } => StatusCode::NOT_FOUND,
            AiopsError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self.0, code = self.0.code(), "Query failed");
        }
        (
            status,
            Json(json!({ "error": self.0.to_string(), "code": self.0.code() })),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Deserialize)]
struct MetricsParams {
    #[serde(default = "default_hostname")]
    hostname: String,
    #[serde(default = "default_hours")]
    hours: i64,
}

#[derive(Debug, Deserialize)]
struct HoursParams {
    #[serde(default = "default_hours")]
    hours: i64,
}

#[derive(Debug, Deserialize)]
struct DaysParams {
    days: Option<i64>,
}

fn default_hostname() -> String {
    "localhost".to_string()
}

fn default_hours() -> i64 {
    24
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn metric_series(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MetricsParams>,
) -> ApiResult<aiops_lib::query::MetricSeries> {
    Ok(Json(
        state
            .queries
            .metrics_series(&params.hostname, params.hours)
            .await?,
    ))
}

async fn open_alerts(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Vec<aiops_lib::query::AlertSummary>> {
    Ok(Json(state.queries.open_alerts().await?))
}

async fn incidents(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Vec<aiops_lib::query::IncidentSummary>> {
    Ok(Json(state.queries.incidents().await?))
}

async fn dashboard(
    State(state): State<Arc<AppState>>,
) -> ApiResult<aiops_lib::query::DashboardSummary> {
    Ok(Json(state.queries.dashboard_summary().await?))
}

async fn host_health(
    State(state): State<Arc<AppState>>,
    Path(hostname): Path<String>,
    Query(params): Query<HoursParams>,
) -> ApiResult<aiops_lib::analytics::HealthScore> {
    Ok(Json(
        state
            .analytics
            .health_score(&hostname, params.hours)
            .await?,
    ))
}

async fn host_trend(
    State(state): State<Arc<AppState>>,
    Path((hostname, kind)): Path<(String, String)>,
    Query(params): Query<DaysParams>,
) -> Result<Response, ApiError> {
    let kind: MetricKind = kind.parse()?;
    let days = params.days.unwrap_or(7);
    match state.analytics.trend(&hostname, kind, days).await? {
        Some(trend) => Ok(Json(trend).into_response()),
        None => Err(ApiError(AiopsError::NotFound {
            entity: "samples",
            id: format!("{hostname}/{kind}"),
        })),
    }
}

async fn alert_stats(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DaysParams>,
) -> ApiResult<aiops_lib::analytics::AlertStatistics> {
    Ok(Json(
        state
            .analytics
            .alert_statistics(params.days.unwrap_or(30))
            .await?,
    ))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/metrics", get(metric_series))
        .route("/api/alerts", get(open_alerts))
        .route("/api/alerts/stats", get(alert_stats))
        .route("/api/incidents", get(incidents))
        .route("/api/dashboard", get(dashboard))
        .route("/api/hosts/:hostname/health", get(host_health))
        .route("/api/hosts/:hostname/trend/:kind", get(host_trend))
        .with_state(state)
}

/// Start the API server, stopping when `shutdown` fires
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aiops_lib::{
        health::components, Alert, Incident, IncidentPriority, MemoryStore, MetricSample,
        NewAlert, Severity,
    };
    use axum::{body::Body, http::Request};
    use chrono::{Duration, Utc};
    use tower::ServiceExt;

    async fn setup_test_app() -> (Router, Arc<dyn Store>, HealthRegistry) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let health_registry = HealthRegistry::new();
        health_registry.register_all().await;
        let state = Arc::new(AppState::new(health_registry.clone(), store.clone()));
        (create_router(state), store, health_registry)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, value)
    }

    fn cpu_alert(value: f64) -> Alert {
        Alert::open(
            NewAlert {
                title: "CPU Usage Alert".to_string(),
                description: format!("CPU usage is {value}% on web1"),
                severity: Severity::High,
                hostname: "web1".to_string(),
                metric_kind: MetricKind::Cpu,
                threshold_value: 80.0,
                current_value: value,
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_healthz_returns_ok_when_healthy() {
        let (app, _, _) = setup_test_app().await;
        let (status, body) = get_json(app, "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_healthz_returns_503_when_unhealthy() {
        let (app, _, health) = setup_test_app().await;
        health
            .set_unhealthy(components::STORE, "snapshot write failed")
            .await;
        let (status, _) = get_json(app, "/healthz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_readyz_follows_ready_flag() {
        let (app, _, health) = setup_test_app().await;
        let (status, _) = get_json(app.clone(), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        health.set_ready(true).await;
        let (status, body) = get_json(app, "/readyz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ready"], true);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_is_plain_text() {
        let (app, _, _) = setup_test_app().await;
        aiops_lib::AiopsMetrics::new().add_samples_collected(1);
        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("aiops_samples_collected_total"));
    }

    #[tokio::test]
    async fn test_metric_series_grouped_by_kind() {
        let (app, store, _) = setup_test_app().await;
        let five_ago = Utc::now() - Duration::minutes(5);
        store
            .insert_samples(vec![
                MetricSample::new("web1", MetricKind::Cpu, 42.0, "%", five_ago),
                MetricSample::new("web1", MetricKind::Memory, 61.0, "%", five_ago),
                MetricSample::new("db1", MetricKind::Cpu, 10.0, "%", five_ago),
            ])
            .await
            .unwrap();

        let (status, body) = get_json(app, "/api/metrics?hostname=web1&hours=1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cpu"][0]["value"], 42.0);
        assert_eq!(body["memory"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_open_alerts_and_dashboard() {
        let (app, store, _) = setup_test_app().await;
        store.insert_alert(cpu_alert(97.0)).await.unwrap();
        store
            .insert_incident(Incident::new(
                "Checkout down",
                "5xx spike",
                IncidentPriority::Urgent,
                "oncall",
                Utc::now(),
            ))
            .await
            .unwrap();

        let (status, alerts) = get_json(app.clone(), "/api/alerts").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(alerts.as_array().unwrap().len(), 1);
        assert_eq!(alerts[0]["hostname"], "web1");
        assert!(alerts[0]["createdAt"].is_string());

        let (_, incidents) = get_json(app.clone(), "/api/incidents").await;
        assert_eq!(incidents[0]["priority"], "urgent");

        let (_, summary) = get_json(app, "/api/dashboard").await;
        assert_eq!(summary["openAlertCount"], 1);
        assert_eq!(summary["openIncidentCount"], 1);
        assert_eq!(summary["automationRunsLast24h"], 0);
    }

    #[tokio::test]
    async fn test_host_health_and_alert_stats() {
        let (app, store, _) = setup_test_app().await;
        store
            .insert_samples(vec![MetricSample::new(
                "web1",
                MetricKind::Cpu,
                25.0,
                "%",
                Utc::now() - Duration::minutes(1),
            )])
            .await
            .unwrap();
        store.insert_alert(cpu_alert(99.0)).await.unwrap();

        let (status, health) = get_json(app.clone(), "/api/hosts/web1/health?hours=2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["overall_score"], 75.0);
        assert_eq!(health["grade"], "C");

        let (status, stats) = get_json(app, "/api/alerts/stats?days=7").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["total_alerts"], 1);
        assert_eq!(stats["by_severity"]["high"], 1);
        assert_eq!(stats["by_severity"]["low"], 0);
    }

    #[tokio::test]
    async fn test_trend_errors_map_to_status_codes() {
        let (app, _, _) = setup_test_app().await;
        let (status, body) = get_json(app.clone(), "/api/hosts/web1/trend/load").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_config");

        let (status, _) = get_json(app, "/api/hosts/web1/trend/cpu?days=3").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_overflowing_windows_are_bad_requests() {
        let (app, _, _) = setup_test_app().await;
        for uri in [
            "/api/metrics?hostname=web1&hours=9223372036854775807",
            "/api/hosts/web1/health?hours=9223372036854775807",
            "/api/hosts/web1/trend/cpu?days=9223372036854775807",
            "/api/alerts/stats?days=9223372036854775807",
            "/api/metrics?hostname=web1&hours=-1",
        ] {
            let (status, body) = get_json(app.clone(), uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["code"], "invalid_config", "{uri}");
        }
    }
}
