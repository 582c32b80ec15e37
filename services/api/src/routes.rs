use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use loan_workflow::workflows::pinjaman::{
    pinjaman_router, ApplicationRepository, AuditSink, WorkflowEngine,
};
use mockable::Clock;
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_workflow_routes<R, A, C>(engine: Arc<WorkflowEngine<R, A, C>>) -> axum::Router
where
    R: ApplicationRepository + 'static,
    A: AuditSink + 'static,
    C: Clock + Send + Sync + 'static,
{
    pinjaman_router(engine)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::build_runtime;
    use axum::body::Body;
    use axum::http::Request;
    use loan_workflow::config::WorkflowConfig;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tower::ServiceExt;

    fn state(ready: bool) -> AppState {
        let recorder = PrometheusBuilder::new().build_recorder();
        AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(recorder.handle()),
        }
    }

    #[tokio::test]
    async fn readiness_reflects_the_startup_flag() {
        let runtime = build_runtime(WorkflowConfig::default());
        let app_state = state(false);
        let app = with_workflow_routes(runtime.engine.clone()).layer(Extension(app_state.clone()));

        let response = app
            .clone()
            .oneshot(Request::get("/ready").body(Body::empty()).expect("request"))
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        app_state.readiness.store(true, Ordering::Release);
        let response = app
            .oneshot(Request::get("/ready").body(Body::empty()).expect("request"))
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::OK);
        runtime.forwarder.abort();
    }

    #[tokio::test]
    async fn workflow_routes_are_mounted_next_to_health() {
        let runtime = build_runtime(WorkflowConfig::default());
        let app = with_workflow_routes(runtime.engine.clone()).layer(Extension(state(true)));

        let response = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::post("/api/v1/pinjaman")
                    .header("content-type", "application/json")
                    .header("x-user-id", "ina")
                    .header("x-user-role", "intake")
                    .body(Body::from(
                        json!({
                            "borrower_name": "Siti Rahma",
                            "amount": 10_000_000u64,
                            "tenor_months": 12
                        })
                        .to_string(),
                    ))
                    .expect("request"),
            )
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::CREATED);
        runtime.forwarder.abort();
    }
}
