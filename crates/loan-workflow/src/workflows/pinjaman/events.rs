//! Audit and notification contract.
//!
//! The engine hands every committed transition to an [`AuditSink`] and to a
//! broadcast stream. Delivery is best-effort: a failing sink is logged and
//! never undoes the transition.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::domain::{Action, ApplicationId, ApplicationStatus, Decision, Role, UserId};

/// What happened to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Submitted,
    Take,
    Release,
    Advance,
    Return,
    Decide,
    Resubmit,
    LockExpired,
    ForceRelease,
}

impl From<Action> for EventKind {
    fn from(action: Action) -> Self {
        match action {
            Action::Take => EventKind::Take,
            Action::Release => EventKind::Release,
            Action::Advance => EventKind::Advance,
            Action::Return => EventKind::Return,
            Action::Decide => EventKind::Decide,
            Action::Resubmit => EventKind::Resubmit,
        }
    }
}

/// Audit and notification payload for one committed transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub application_id: ApplicationId,
    pub action: EventKind,
    pub from_status: ApplicationStatus,
    pub to_status: ApplicationStatus,
    pub actor_id: UserId,
    pub actor_role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
    /// Record version after the transition; orders events per application.
    pub version: u64,
    pub timestamp: DateTime<Utc>,
}

/// Outbound hook to the audit log and notification gateway.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &WorkflowEvent) -> Result<(), AuditError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuditError {
    #[error("audit transport unavailable: {0}")]
    Transport(String),
    #[error("audit queue closed")]
    Closed,
}

/// Sink that writes each event to the `loan_workflow::audit` log target and
/// retains nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &WorkflowEvent) -> Result<(), AuditError> {
        info!(
            target: "loan_workflow::audit",
            application_id = %event.application_id,
            action = ?event.action,
            from = event.from_status.label(),
            to = event.to_status.label(),
            actor = %event.actor_id,
            role = event.actor_role.label(),
            note = event.note.as_deref(),
            decision = ?event.decision,
            version = event.version,
            at = %event.timestamp,
            "workflow event"
        );
        Ok(())
    }
}

/// Fans a committed event out to the audit sink and to stream subscribers.
pub struct EventEmitter<A> {
    sink: Arc<A>,
    stream: broadcast::Sender<WorkflowEvent>,
}

impl<A> EventEmitter<A>
where
    A: AuditSink,
{
    pub fn new(sink: Arc<A>, capacity: usize) -> Self {
        let (stream, _) = broadcast::channel(capacity.max(1));
        Self { sink, stream }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.stream.subscribe()
    }

    pub fn emit(&self, event: WorkflowEvent) {
        if let Err(err) = self.sink.record(&event) {
            warn!(
                application_id = %event.application_id,
                action = ?event.action,
                error = %err,
                "audit sink rejected workflow event"
            );
        }

        // No subscribers is the normal idle state.
        let _ = self.stream.send(event);
    }
}

/// Retry schedule for the background audit forwarder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

/// Sink that only enqueues; a spawned forwarder performs the real delivery.
#[derive(Debug, Clone)]
pub struct QueuedAuditSink {
    queue: mpsc::UnboundedSender<WorkflowEvent>,
}

impl AuditSink for QueuedAuditSink {
    fn record(&self, event: &WorkflowEvent) -> Result<(), AuditError> {
        self.queue
            .send(event.clone())
            .map_err(|_| AuditError::Closed)
    }
}

/// Spawn a task draining queued events into `sink`, retrying with linear
/// backoff. Must be called from within a tokio runtime.
pub fn spawn_audit_forwarder<S>(sink: Arc<S>, retry: RetryPolicy) -> (QueuedAuditSink, JoinHandle<()>)
where
    S: AuditSink + 'static,
{
    let (queue, mut inbox) = mpsc::unbounded_channel::<WorkflowEvent>();
    let handle = tokio::spawn(async move {
        while let Some(event) = inbox.recv().await {
            deliver(sink.as_ref(), &event, retry).await;
        }
    });
    (QueuedAuditSink { queue }, handle)
}

async fn deliver<S>(sink: &S, event: &WorkflowEvent, retry: RetryPolicy)
where
    S: AuditSink,
{
    let attempts = retry.max_attempts.max(1);
    for attempt in 1..=attempts {
        match sink.record(event) {
            Ok(()) => return,
            Err(err) if attempt < attempts => {
                warn!(
                    application_id = %event.application_id,
                    attempt,
                    error = %err,
                    "audit delivery failed, retrying"
                );
                tokio::time::sleep(retry.backoff * attempt).await;
            }
            Err(err) => {
                error!(
                    application_id = %event.application_id,
                    action = ?event.action,
                    attempts,
                    error = %err,
                    "audit delivery abandoned"
                );
            }
        }
    }
}
