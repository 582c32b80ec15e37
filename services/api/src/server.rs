use crate::cli::ServeArgs;
use crate::infra::{build_runtime, spawn_lock_reaper, AppState, Runtime};
use crate::routes::with_workflow_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use loan_workflow::config::AppConfig;
use loan_workflow::error::AppError;
use loan_workflow::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let lock_ttl = config.workflow.lock_ttl;
    let Runtime { engine, forwarder } = build_runtime(config.workflow.clone());
    let reaper = spawn_lock_reaper(engine.clone(), lock_ttl);

    let app = with_workflow_routes(engine)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        min_note_chars = config.workflow.min_note_chars,
        resubmission = ?config.workflow.resubmission,
        lock_ttl_secs = lock_ttl.map(|ttl| ttl.num_seconds()),
        "loan workflow service ready"
    );

    let served = axum::serve(listener, app).await;

    if let Some(reaper) = reaper {
        reaper.abort();
    }
    forwarder.abort();
    served?;
    Ok(())
}
