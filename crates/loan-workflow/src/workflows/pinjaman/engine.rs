use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use mockable::{Clock, DefaultClock};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::WorkflowConfig;

use super::assignment::{AssignmentStore, OwnerRecord};
use super::authorization::{AuthorizationRules, PermissionSet};
use super::domain::{
    Action, Actor, ApplicationId, ApplicationStatus, Decision, LoanApplication, LoanRequest,
    Role, UserId,
};
use super::error::{ForbiddenReason, ValidationError, WorkflowError};
use super::events::{AuditSink, EventEmitter, EventKind, WorkflowEvent};
use super::lock::LockManager;
use super::repository::ApplicationRepository;

const DEFAULT_SCAN_LIMIT: usize = 1_000;

static APPLICATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_application_id() -> ApplicationId {
    let id = APPLICATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ApplicationId(format!("pjm-{id:06}"))
}

/// One inbound `Execute` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub application_id: ApplicationId,
    pub action: Action,
    pub actor: Actor,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub decision: Option<Decision>,
}

impl ExecuteRequest {
    pub fn new(application_id: ApplicationId, action: Action, actor: Actor) -> Self {
        Self {
            application_id,
            action,
            actor,
            note: None,
            decision: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_decision(mut self, decision: Decision) -> Self {
        self.decision = Some(decision);
        self
    }
}

/// State returned synchronously after a committed action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionOutcome {
    pub application_id: ApplicationId,
    pub action: EventKind,
    pub from_status: ApplicationStatus,
    pub status: ApplicationStatus,
    pub locked_by: Option<UserId>,
    pub version: u64,
}

/// What a transaction committed; turned into the outcome and the event.
struct Committed {
    from: ApplicationStatus,
    to: ApplicationStatus,
    locked_by: Option<UserId>,
    note: Option<String>,
    decision: Option<Decision>,
    version: u64,
}

/// Orchestrator composing the registry, authorization rules, lock manager,
/// assignment store, and event emitter over one application store.
pub struct WorkflowEngine<R, A, C = DefaultClock> {
    repository: Arc<R>,
    clock: Arc<C>,
    rules: AuthorizationRules,
    locks: LockManager<R, C>,
    assignments: AssignmentStore<R>,
    emitter: EventEmitter<A>,
    scan_limit: usize,
}

impl<R, A, C> WorkflowEngine<R, A, C>
where
    R: ApplicationRepository + 'static,
    A: AuditSink + 'static,
    C: Clock + Send + Sync + 'static,
{
    pub fn new(repository: Arc<R>, audit: Arc<A>, clock: Arc<C>, config: WorkflowConfig) -> Self {
        let lock_policy = config.lock_policy();
        let rules = AuthorizationRules::new(lock_policy, config.resubmission, config.min_note_chars);

        Self {
            locks: LockManager::new(repository.clone(), clock.clone(), lock_policy),
            assignments: AssignmentStore::new(repository.clone()),
            emitter: EventEmitter::new(audit, config.event_buffer),
            repository,
            clock,
            rules,
            scan_limit: DEFAULT_SCAN_LIMIT,
        }
    }

    /// Cap on records returned by one work-queue or reaper scan.
    pub fn with_scan_limit(mut self, limit: usize) -> Self {
        self.scan_limit = limit.max(1);
        self
    }

    pub fn assignment_store(&self) -> &AssignmentStore<R> {
        &self.assignments
    }

    /// Stream of committed workflow events for push-style consumers.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.emitter.subscribe()
    }

    /// Create a new application on behalf of an intake clerk.
    pub fn submit(
        &self,
        actor: &Actor,
        request: LoanRequest,
    ) -> Result<LoanApplication, WorkflowError> {
        if actor.role != Role::Intake {
            return Err(WorkflowError::Forbidden {
                operation: "submit",
                role: actor.role,
                reason: ForbiddenReason::WrongRole(Role::Intake),
            });
        }
        validate_request(&request)?;

        let now = self.clock.utc();
        let application =
            LoanApplication::new(next_application_id(), actor.user_id.clone(), request, now);
        let stored = self.repository.insert(application)?;

        info!(application_id = %stored.id, actor = %actor.user_id, "loan application submitted");
        self.emitter.emit(WorkflowEvent {
            application_id: stored.id.clone(),
            action: EventKind::Submitted,
            from_status: stored.status,
            to_status: stored.status,
            actor_id: actor.user_id.clone(),
            actor_role: actor.role,
            note: None,
            decision: None,
            version: stored.version,
            timestamp: now,
        });
        Ok(stored)
    }

    pub fn get(&self, id: &ApplicationId) -> Result<LoanApplication, WorkflowError> {
        self.repository
            .fetch(id)?
            .ok_or_else(|| WorkflowError::NotFound(id.clone()))
    }

    /// Run one action atomically against the store and emit its event.
    pub fn execute(&self, request: ExecuteRequest) -> Result<ExecutionOutcome, WorkflowError> {
        let ExecuteRequest {
            application_id,
            action,
            actor,
            note,
            decision,
        } = request;
        let now = self.clock.utc();

        let committed = self
            .repository
            .transact(&application_id, |application| {
                self.apply(application, &actor, action, note.as_deref(), decision, now)
            })
            .map_err(|err| err.for_application(&application_id));

        let committed = match committed {
            Ok(committed) => committed,
            Err(err) => {
                debug!(
                    application_id = %application_id,
                    action = action.label(),
                    actor = %actor.user_id,
                    role = actor.role.label(),
                    error = %err,
                    kind = err.kind(),
                    "workflow action rejected"
                );
                return Err(err);
            }
        };

        info!(
            application_id = %application_id,
            action = action.label(),
            from = committed.from.label(),
            to = committed.to.label(),
            actor = %actor.user_id,
            role = actor.role.label(),
            version = committed.version,
            "workflow action committed"
        );

        let outcome = ExecutionOutcome {
            application_id: application_id.clone(),
            action: action.into(),
            from_status: committed.from,
            status: committed.to,
            locked_by: committed.locked_by.clone(),
            version: committed.version,
        };

        self.emitter.emit(WorkflowEvent {
            application_id,
            action: action.into(),
            from_status: committed.from,
            to_status: committed.to,
            actor_id: actor.user_id,
            actor_role: actor.role,
            note: committed.note,
            decision: committed.decision,
            version: committed.version,
            timestamp: now,
        });

        Ok(outcome)
    }

    fn apply(
        &self,
        application: &mut LoanApplication,
        actor: &Actor,
        action: Action,
        note: Option<&str>,
        decision: Option<Decision>,
        now: DateTime<Utc>,
    ) -> Result<Committed, WorkflowError> {
        let rule = self.rules.authorize(application, actor, action, now)?;
        let note = self.rules.validate_note(action, note)?;
        let to = rule.resolve(decision)?;
        let from = application.status;
        let policy = self.locks.policy();

        match action {
            Action::Take => {
                policy.claim(application, &actor.user_id, now)?;
                if let Some(stage) = to.stage() {
                    if let OwnerRecord::KeptExisting(owner) =
                        application.owners.record(stage, &actor.user_id)
                    {
                        debug!(
                            application_id = %application.id,
                            stage = stage.label(),
                            owner = %owner,
                            claimant = %actor.user_id,
                            "stage owner kept; claimant works it without ownership"
                        );
                    }
                }
            }
            Action::Release => {
                policy.release(application, &actor.user_id, now)?;
            }
            Action::Advance | Action::Return | Action::Decide | Action::Resubmit => {
                // The holder hands the application back to the pool (or to the
                // next stage, unclaimed) in the same commit as the transition.
                // The stored note always belongs to the latest transition.
                application.lock = None;
                application.note = note.clone();
            }
        }

        application.status = to;
        application.updated_at = now;

        Ok(Committed {
            from,
            to,
            locked_by: application.locked_by().cloned(),
            note,
            decision: decision.filter(|_| action == Action::Decide),
            version: application.version + 1,
        })
    }

    /// Permission set for `actor`, computed with the rules `execute` enforces.
    pub fn permissions(
        &self,
        id: &ApplicationId,
        actor: &Actor,
    ) -> Result<PermissionSet, WorkflowError> {
        let application = self.get(id)?;
        Ok(self.rules.permissions(&application, actor, self.clock.utc()))
    }

    /// Applications `actor` could take right now, oldest first.
    pub fn work_queue(&self, actor: &Actor) -> Result<Vec<LoanApplication>, WorkflowError> {
        let now = self.clock.utc();
        let claimable = self.repository.open_matching(self.scan_limit, |application| {
            self.rules.can_take(application, actor, now)
        })?;
        Ok(claimable)
    }

    /// Supervisor override clearing whatever lock an application carries.
    pub fn force_release(
        &self,
        id: &ApplicationId,
        actor: &Actor,
    ) -> Result<ExecutionOutcome, WorkflowError> {
        if actor.role != Role::Supervisor {
            return Err(WorkflowError::Forbidden {
                operation: "force_release",
                role: actor.role,
                reason: ForbiddenReason::WrongRole(Role::Supervisor),
            });
        }

        let now = self.clock.utc();
        let (status, previous, version) = self
            .repository
            .transact(id, |application| -> Result<_, WorkflowError> {
                if application.status.is_terminal() {
                    return Err(WorkflowError::Terminal(application.status));
                }
                let previous = application.lock.take().ok_or(WorkflowError::NotLocked)?;
                application.updated_at = now;
                Ok((application.status, previous, application.version + 1))
            })
            .map_err(|err| err.for_application(id))?;

        info!(
            application_id = %id,
            supervisor = %actor.user_id,
            previous_holder = %previous.holder,
            "lock force-released"
        );

        self.emitter.emit(WorkflowEvent {
            application_id: id.clone(),
            action: EventKind::ForceRelease,
            from_status: status,
            to_status: status,
            actor_id: actor.user_id.clone(),
            actor_role: actor.role,
            note: Some(format!("lock held by {} cleared", previous.holder)),
            decision: None,
            version,
            timestamp: now,
        });

        Ok(ExecutionOutcome {
            application_id: id.clone(),
            action: EventKind::ForceRelease,
            from_status: status,
            status,
            locked_by: None,
            version,
        })
    }

    /// Clear locks whose TTL elapsed and announce each one.
    pub fn reap_expired_locks(&self) -> Result<Vec<ApplicationId>, WorkflowError> {
        let reaped = self.locks.reap_expired(self.scan_limit)?;
        let system = Actor::system();
        let now = self.clock.utc();

        let mut ids = Vec::with_capacity(reaped.len());
        for expired in reaped {
            self.emitter.emit(WorkflowEvent {
                application_id: expired.application_id.clone(),
                action: EventKind::LockExpired,
                from_status: expired.status,
                to_status: expired.status,
                actor_id: system.user_id.clone(),
                actor_role: system.role,
                note: Some(format!("lock held by {} expired", expired.lock.holder)),
                decision: None,
                version: expired.version,
                timestamp: now,
            });
            ids.push(expired.application_id);
        }
        Ok(ids)
    }
}

fn validate_request(request: &LoanRequest) -> Result<(), ValidationError> {
    if request.borrower_name.trim().is_empty() {
        return Err(ValidationError::EmptyBorrowerName);
    }
    if request.amount == 0 {
        return Err(ValidationError::InvalidAmount);
    }
    if request.tenor_months == 0 {
        return Err(ValidationError::InvalidTenor);
    }
    Ok(())
}
