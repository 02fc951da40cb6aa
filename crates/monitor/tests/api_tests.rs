//! Integration tests for the monitor API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use edge_veda_lib::{
    budget::{BudgetProfile, EdgeVedaBudget},
    health::{components, HealthRegistry},
    EdgeVedaConfig, EdgeVedaSession, PlatformProbes, TaskPriority, Workload,
};
use edge_veda_monitor::api::{create_router, AppState};
use std::convert::Infallible;
use std::sync::Arc;
use tower::ServiceExt;

async fn setup_test_app() -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::SCHEDULER).await;

    let session = Arc::new(
        EdgeVedaSession::new(EdgeVedaConfig::default(), PlatformProbes::unsupported()).unwrap(),
    );
    let state = Arc::new(AppState::new(health_registry, session));
    let router = create_router(state.clone());

    (router, state)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

#[tokio::test]
async fn test_healthz_is_degraded_without_platform_telemetry() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/healthz").await;

    // Degraded still returns 200 (operational)
    assert_eq!(status, StatusCode::OK);
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["components"]["latency"]["status"], "healthy");
    assert_eq!(health["components"]["thermal"]["status"], "degraded");
    assert_eq!(health["components"]["scheduler"]["status"], "healthy");
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, state) = setup_test_app().await;
    state
        .health_registry
        .set_unhealthy(components::SCHEDULER, "Scheduler stopped")
        .await;

    let (status, body) = get(app, "/healthz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_returns_503_when_not_ready() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/readyz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let readiness: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(readiness["ready"], false);
}

#[tokio::test]
async fn test_readyz_returns_ok_when_ready() {
    let (app, state) = setup_test_app().await;
    state.health_registry.set_ready(true).await;

    let (status, body) = get(app, "/readyz").await;

    assert_eq!(status, StatusCode::OK);
    let readiness: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, state) = setup_test_app().await;
    state
        .session
        .scheduler()
        .schedule_task(TaskPriority::Normal, Workload::Text, || async {
            Ok::<_, Infallible>(())
        })
        .await
        .unwrap();

    let (status, body) = get(app, "/metrics").await;

    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("edge_veda_task_latency_seconds"));
    assert!(text.contains("edge_veda_tasks_total"));
    assert!(text.contains("edge_veda_thermal_level"));
    assert!(text.contains("edge_veda_dropped_frames"));
}

#[tokio::test]
async fn test_telemetry_reports_session_state() {
    let (app, state) = setup_test_app().await;
    state
        .session
        .scheduler()
        .set_compute_budget(EdgeVedaBudget::adaptive(BudgetProfile::Balanced));
    for _ in 0..3 {
        state
            .session
            .scheduler()
            .schedule_task(TaskPriority::High, Workload::Vision, || async {
                Ok::<_, Infallible>(())
            })
            .await
            .unwrap();
    }

    let (status, body) = get(app, "/telemetry").await;

    assert_eq!(status, StatusCode::OK);
    let telemetry: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(telemetry["device"], "local");
    assert_eq!(telemetry["latency"]["sample_count"], 3);
    assert_eq!(telemetry["queue"]["completed"], 3);
    assert_eq!(telemetry["thermal"]["level"], -1);
    assert_eq!(telemetry["warmup_complete"], false);
    assert!(telemetry["baseline"].is_null());
    assert_eq!(telemetry["budget"]["mode"], "adaptive");
    assert_eq!(telemetry["budget"]["profile"], "balanced");
    assert!(telemetry["working_budget"].is_null());
}
