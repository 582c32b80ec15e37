use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Duration, Local, TimeZone, Utc};
use mockable::Clock;
use serde_json::Value;

use crate::config::WorkflowConfig;
use crate::workflows::pinjaman::domain::{
    Action, Actor, ApplicationId, ApplicationStatus, Decision, LoanApplication, LoanRequest, Role,
    UserId,
};
use crate::workflows::pinjaman::engine::{ExecuteRequest, ExecutionOutcome, WorkflowEngine};
use crate::workflows::pinjaman::error::WorkflowError;
use crate::workflows::pinjaman::events::{AuditError, AuditSink, WorkflowEvent};
use crate::workflows::pinjaman::memory::{InMemoryApplicationRepository, InMemoryAuditLog};
use crate::workflows::pinjaman::repository::{ApplicationRepository, RepositoryError};

pub(super) const ADVANCE_NOTE: &str = "Documents complete, forwarding";
pub(super) const RETURN_NOTE: &str = "Missing income proof";
pub(super) const DECISION_NOTE: &str = "Income and collateral sufficient";

pub(super) fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

/// Clock pinned to a settable instant.
#[derive(Debug)]
pub(super) struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub(super) fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub(super) fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().expect("clock mutex poisoned");
        *guard = *guard + by;
    }
}

impl Clock for FixedClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock mutex poisoned")
    }
}

pub(super) fn intake() -> Actor {
    Actor::new("ina", Role::Intake)
}

pub(super) fn credit_admin(name: &str) -> Actor {
    Actor::new(name, Role::CreditAdmin)
}

pub(super) fn analyst(name: &str) -> Actor {
    Actor::new(name, Role::Analyst)
}

pub(super) fn decision_maker(name: &str) -> Actor {
    Actor::new(name, Role::DecisionMaker)
}

pub(super) fn supervisor() -> Actor {
    Actor::new("sari", Role::Supervisor)
}

pub(super) fn loan_request() -> LoanRequest {
    LoanRequest {
        borrower_name: "Budi Santoso".to_string(),
        amount: 25_000_000,
        tenor_months: 24,
    }
}

/// Bare application record for rule-level tests that bypass the store.
pub(super) fn application_in(status: ApplicationStatus) -> LoanApplication {
    let mut application = LoanApplication::new(
        ApplicationId("pjm-test".to_string()),
        intake().user_id,
        loan_request(),
        start_time(),
    );
    application.status = status;
    application
}

pub(super) type TestEngine = WorkflowEngine<InMemoryApplicationRepository, InMemoryAuditLog, FixedClock>;

pub(super) struct Harness {
    pub(super) engine: Arc<TestEngine>,
    pub(super) repository: Arc<InMemoryApplicationRepository>,
    pub(super) audit: Arc<InMemoryAuditLog>,
    pub(super) clock: Arc<FixedClock>,
}

pub(super) fn harness() -> Harness {
    harness_with(WorkflowConfig::default())
}

pub(super) fn harness_with(config: WorkflowConfig) -> Harness {
    harness_tuned(config, |engine| engine)
}

/// Harness whose engine is adjusted by `tune` before it is shared.
pub(super) fn harness_tuned(
    config: WorkflowConfig,
    tune: impl FnOnce(TestEngine) -> TestEngine,
) -> Harness {
    let repository = Arc::new(InMemoryApplicationRepository::default());
    let audit = Arc::new(InMemoryAuditLog::default());
    let clock = Arc::new(FixedClock::at(start_time()));
    let engine = Arc::new(tune(WorkflowEngine::new(
        repository.clone(),
        audit.clone(),
        clock.clone(),
        config,
    )));
    Harness {
        engine,
        repository,
        audit,
        clock,
    }
}

impl Harness {
    /// Submit `count` applications one minute apart, oldest first.
    pub(super) fn submit_many(&self, count: usize) -> Vec<ApplicationId> {
        (0..count)
            .map(|_| {
                let id = self.submit();
                self.clock.advance(Duration::minutes(1));
                id
            })
            .collect()
    }

    pub(super) fn submit(&self) -> ApplicationId {
        self.engine
            .submit(&intake(), loan_request())
            .expect("submission succeeds")
            .id
    }

    pub(super) fn load(&self, id: &ApplicationId) -> LoanApplication {
        self.engine.get(id).expect("application exists")
    }

    pub(super) fn act(
        &self,
        id: &ApplicationId,
        action: Action,
        actor: &Actor,
    ) -> Result<ExecutionOutcome, WorkflowError> {
        self.engine
            .execute(ExecuteRequest::new(id.clone(), action, actor.clone()))
    }

    pub(super) fn act_with_note(
        &self,
        id: &ApplicationId,
        action: Action,
        actor: &Actor,
        note: &str,
    ) -> Result<ExecutionOutcome, WorkflowError> {
        self.engine
            .execute(ExecuteRequest::new(id.clone(), action, actor.clone()).with_note(note))
    }

    pub(super) fn decide(
        &self,
        id: &ApplicationId,
        actor: &Actor,
        decision: Decision,
    ) -> Result<ExecutionOutcome, WorkflowError> {
        self.engine.execute(
            ExecuteRequest::new(id.clone(), Action::Decide, actor.clone())
                .with_note(DECISION_NOTE)
                .with_decision(decision),
        )
    }

    /// Submit and walk an application into `status`, leaving it unlocked.
    ///
    /// Stage owners along the way are `ari`, `citra`, and `eka`.
    pub(super) fn application_at(&self, status: ApplicationStatus) -> ApplicationId {
        let id = self.submit();
        let admin = credit_admin("ari");
        let analyst = analyst("citra");
        let decider = decision_maker("eka");

        use ApplicationStatus::{Analyzing, ReadyForDecision, Returned, UnderReview};
        let path: Vec<ApplicationStatus> = match status {
            ApplicationStatus::Submitted => Vec::new(),
            UnderReview => vec![UnderReview],
            Analyzing => vec![UnderReview, Analyzing],
            ReadyForDecision => vec![UnderReview, Analyzing, ReadyForDecision],
            Returned => vec![UnderReview, Returned],
            ApplicationStatus::Approved | ApplicationStatus::Rejected => {
                vec![UnderReview, Analyzing, ReadyForDecision, status]
            }
        };

        for step in path {
            match step {
                ApplicationStatus::UnderReview => {
                    self.act(&id, Action::Take, &admin).expect("credit admin claims");
                    self.act(&id, Action::Release, &admin).expect("credit admin releases");
                }
                ApplicationStatus::Analyzing => {
                    self.act(&id, Action::Take, &admin).expect("credit admin claims");
                    self.act_with_note(&id, Action::Advance, &admin, ADVANCE_NOTE)
                        .expect("credit admin advances");
                }
                ApplicationStatus::ReadyForDecision => {
                    self.act(&id, Action::Take, &analyst).expect("analyst claims");
                    self.act_with_note(&id, Action::Advance, &analyst, ADVANCE_NOTE)
                        .expect("analyst advances");
                }
                ApplicationStatus::Returned => {
                    self.act(&id, Action::Take, &admin).expect("credit admin claims");
                    self.act_with_note(&id, Action::Return, &admin, RETURN_NOTE)
                        .expect("credit admin returns");
                }
                ApplicationStatus::Approved => {
                    self.act(&id, Action::Take, &decider).expect("decider claims");
                    self.decide(&id, &decider, Decision::Approve).expect("approve");
                }
                ApplicationStatus::Rejected => {
                    self.act(&id, Action::Take, &decider).expect("decider claims");
                    self.decide(&id, &decider, Decision::Reject).expect("reject");
                }
                ApplicationStatus::Submitted => {}
            }
        }

        let application = self.load(&id);
        assert_eq!(application.status, status);
        assert!(application.lock.is_none());
        id
    }
}

pub(super) fn user(name: &str) -> UserId {
    UserId::new(name)
}

/// Sink whose transport is permanently down.
#[derive(Default)]
pub(super) struct FailingAudit;

impl AuditSink for FailingAudit {
    fn record(&self, _event: &WorkflowEvent) -> Result<(), AuditError> {
        Err(AuditError::Transport("gateway offline".to_string()))
    }
}

/// Sink that fails a fixed number of times before accepting events.
#[derive(Default)]
pub(super) struct FlakyAudit {
    failures_left: Mutex<u32>,
    attempts: Mutex<u32>,
    delivered: Mutex<Vec<WorkflowEvent>>,
}

impl FlakyAudit {
    pub(super) fn failing(times: u32) -> Self {
        Self {
            failures_left: Mutex::new(times),
            ..Self::default()
        }
    }

    pub(super) fn attempts(&self) -> u32 {
        *self.attempts.lock().expect("attempts mutex poisoned")
    }

    pub(super) fn delivered(&self) -> Vec<WorkflowEvent> {
        self.delivered.lock().expect("delivered mutex poisoned").clone()
    }
}

impl AuditSink for FlakyAudit {
    fn record(&self, event: &WorkflowEvent) -> Result<(), AuditError> {
        *self.attempts.lock().expect("attempts mutex poisoned") += 1;
        let mut failures_left = self.failures_left.lock().expect("failures mutex poisoned");
        if *failures_left > 0 {
            *failures_left -= 1;
            return Err(AuditError::Transport("timeout".to_string()));
        }
        self.delivered
            .lock()
            .expect("delivered mutex poisoned")
            .push(event.clone());
        Ok(())
    }
}

/// Store whose backend is unreachable.
pub(super) struct UnavailableRepository;

impl ApplicationRepository for UnavailableRepository {
    fn insert(&self, _application: LoanApplication) -> Result<LoanApplication, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &ApplicationId) -> Result<Option<LoanApplication>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn open_matching<P>(&self, _limit: usize, _matches: P) -> Result<Vec<LoanApplication>, RepositoryError>
    where
        P: FnMut(&LoanApplication) -> bool,
    {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn transact<T, E, F>(&self, _id: &ApplicationId, _mutate: F) -> Result<T, E>
    where
        F: FnOnce(&mut LoanApplication) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        Err(RepositoryError::Unavailable("database offline".to_string()).into())
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
