use loan_workflow::config::WorkflowConfig;
use loan_workflow::workflows::pinjaman::{
    spawn_audit_forwarder, InMemoryApplicationRepository, QueuedAuditSink, RetryPolicy,
    TracingAuditSink, WorkflowEngine,
};
use metrics_exporter_prometheus::PrometheusHandle;
use mockable::DefaultClock;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub(crate) type ApiEngine =
    WorkflowEngine<InMemoryApplicationRepository, QueuedAuditSink, DefaultClock>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// In-process wiring: memory store, queued audit delivery to the log, system clock.
pub(crate) struct Runtime {
    pub(crate) engine: Arc<ApiEngine>,
    pub(crate) forwarder: JoinHandle<()>,
}

pub(crate) fn build_runtime(config: WorkflowConfig) -> Runtime {
    let (queue, forwarder) = spawn_audit_forwarder(Arc::new(TracingAuditSink), RetryPolicy::default());
    let engine = WorkflowEngine::new(
        Arc::new(InMemoryApplicationRepository::default()),
        Arc::new(queue),
        Arc::new(DefaultClock),
        config,
    );

    Runtime {
        engine: Arc::new(engine),
        forwarder,
    }
}

/// How often the reaper scans: half the TTL, between 5 seconds and 5 minutes.
pub(crate) fn reap_interval(ttl: chrono::Duration) -> Duration {
    let half = ttl.to_std().unwrap_or(Duration::ZERO) / 2;
    half.clamp(Duration::from_secs(5), Duration::from_secs(300))
}

/// Periodically clear expired claims. Returns `None` when locks never expire.
pub(crate) fn spawn_lock_reaper(
    engine: Arc<ApiEngine>,
    ttl: Option<chrono::Duration>,
) -> Option<JoinHandle<()>> {
    let period = reap_interval(ttl?);
    info!(?period, "lock reaper started");

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            match engine.reap_expired_locks() {
                Ok(reaped) if !reaped.is_empty() => {
                    info!(count = reaped.len(), "expired claims returned to the pool");
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "lock reaper scan failed"),
            }
        }
    }))
}
