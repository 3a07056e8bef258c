//! Probe and metrics endpoints served by the controller.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use eventing_controller::observability::metrics;
use eventing_controller::server::{router, ServerState};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tower::ServiceExt;

async fn get(state: &Arc<ServerState>, uri: &str) -> (StatusCode, String) {
    let response = router(Arc::clone(state))
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn test_liveness_is_always_ok() {
    let state = Arc::new(ServerState::new());
    assert_eq!(get(&state, "/healthz").await.0, StatusCode::OK);
}

#[tokio::test]
async fn test_readiness_follows_server_state() {
    let state = Arc::new(ServerState::new());
    assert_eq!(get(&state, "/readyz").await.0, StatusCode::SERVICE_UNAVAILABLE);

    state.is_ready.store(true, Ordering::Relaxed);
    assert_eq!(get(&state, "/readyz").await.0, StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_are_exported_in_text_format() {
    metrics::register_metrics().unwrap();
    metrics::increment_reconciliations();
    metrics::increment_requeues("inactive");

    let state = Arc::new(ServerState::new());
    let (status, body) = get(&state, "/metrics").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("eventing_controller_reconciliations_total"));
    assert!(body.contains("eventing_controller_requeues_total{reason=\"inactive\"}"));
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let state = Arc::new(ServerState::new());
    assert_eq!(get(&state, "/nope").await.0, StatusCode::NOT_FOUND);
}
