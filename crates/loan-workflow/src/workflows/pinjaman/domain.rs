use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for loan applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Back-office user reference, pre-verified by the session layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Human roles participating in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Intake,
    CreditAdmin,
    Analyst,
    DecisionMaker,
    Supervisor,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::Intake => "intake",
            Role::CreditAdmin => "credit_admin",
            Role::Analyst => "analyst",
            Role::DecisionMaker => "decision_maker",
            Role::Supervisor => "supervisor",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "intake" => Some(Role::Intake),
            "credit_admin" => Some(Role::CreditAdmin),
            "analyst" => Some(Role::Analyst),
            "decision_maker" => Some(Role::DecisionMaker),
            "supervisor" => Some(Role::Supervisor),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The `(user, role)` pair every engine call acts on behalf of.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: UserId(user_id.into()),
            role,
        }
    }

    /// Actor recorded on events raised by the engine itself (lock reaping).
    pub fn system() -> Self {
        Self::new("system", Role::Supervisor)
    }
}

/// Pipeline status of a loan application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Submitted,
    UnderReview,
    Returned,
    Analyzing,
    ReadyForDecision,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 7] = [
        ApplicationStatus::Submitted,
        ApplicationStatus::UnderReview,
        ApplicationStatus::Returned,
        ApplicationStatus::Analyzing,
        ApplicationStatus::ReadyForDecision,
        ApplicationStatus::Approved,
        ApplicationStatus::Rejected,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::UnderReview => "under_review",
            ApplicationStatus::Returned => "returned",
            ApplicationStatus::Analyzing => "analyzing",
            ApplicationStatus::ReadyForDecision => "ready_for_decision",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            ApplicationStatus::Approved | ApplicationStatus::Rejected
        )
    }

    /// Stage whose role works the application while it sits in this status.
    pub const fn stage(self) -> Option<Stage> {
        match self {
            ApplicationStatus::Submitted | ApplicationStatus::UnderReview => {
                Some(Stage::CreditAdmin)
            }
            ApplicationStatus::Analyzing => Some(Stage::Analysis),
            ApplicationStatus::ReadyForDecision => Some(Stage::Decision),
            ApplicationStatus::Returned
            | ApplicationStatus::Approved
            | ApplicationStatus::Rejected => None,
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Pipeline stage with a sticky owner of record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    CreditAdmin,
    Analysis,
    Decision,
}

impl Stage {
    /// Role allowed to work this stage.
    pub const fn role(self) -> Role {
        match self {
            Stage::CreditAdmin => Role::CreditAdmin,
            Stage::Analysis => Role::Analyst,
            Stage::Decision => Role::DecisionMaker,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Stage::CreditAdmin => "credit_admin",
            Stage::Analysis => "analysis",
            Stage::Decision => "decision",
        }
    }
}

/// Inbound actions accepted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Take,
    Release,
    Advance,
    Return,
    Decide,
    Resubmit,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::Take,
        Action::Release,
        Action::Advance,
        Action::Return,
        Action::Decide,
        Action::Resubmit,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Action::Take => "take",
            Action::Release => "release",
            Action::Advance => "advance",
            Action::Return => "return",
            Action::Decide => "decide",
            Action::Resubmit => "resubmit",
        }
    }

    /// Actions that must carry a note of the configured minimum length.
    pub const fn requires_note(self) -> bool {
        matches!(self, Action::Advance | Action::Return | Action::Decide)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Final verdict selected by the decision-maker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

/// Exclusive claim on an application. Holder and timestamp travel together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    pub holder: UserId,
    pub acquired_at: DateTime<Utc>,
}

/// Sticky owners of record for each stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOwners {
    pub credit_admin: Option<UserId>,
    pub analyst: Option<UserId>,
    pub decision: Option<UserId>,
}

/// Borrower ("nasabah") data captured at intake. Opaque to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanRequest {
    pub borrower_name: String,
    pub amount: u64,
    pub tenor_months: u16,
}

/// Loan application ("pinjaman") as held by the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanApplication {
    pub id: ApplicationId,
    pub status: ApplicationStatus,
    pub intake_owner: UserId,
    pub owners: StageOwners,
    pub lock: Option<Lock>,
    pub note: Option<String>,
    pub request: LoanRequest,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl LoanApplication {
    pub fn new(
        id: ApplicationId,
        intake_owner: UserId,
        request: LoanRequest,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            status: ApplicationStatus::Submitted,
            intake_owner,
            owners: StageOwners::default(),
            lock: None,
            note: None,
            request,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn locked_by(&self) -> Option<&UserId> {
        self.lock.as_ref().map(|lock| &lock.holder)
    }

    pub fn locked_at(&self) -> Option<DateTime<Utc>> {
        self.lock.as_ref().map(|lock| lock.acquired_at)
    }

    pub fn status_view(&self) -> ApplicationStatusView {
        ApplicationStatusView {
            application_id: self.id.clone(),
            status: self.status.label(),
            intake_owner: self.intake_owner.clone(),
            credit_admin_owner: self.owners.credit_admin.clone(),
            analyst_owner: self.owners.analyst.clone(),
            decision_owner: self.owners.decision.clone(),
            locked_by: self.locked_by().cloned(),
            locked_at: self.locked_at(),
            note: self.note.clone(),
            version: self.version,
        }
    }
}

/// Sanitized representation of an application's workflow position.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationStatusView {
    pub application_id: ApplicationId,
    pub status: &'static str,
    pub intake_owner: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credit_admin_owner: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyst_owner: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_owner: Option<UserId>,
    pub locked_by: Option<UserId>,
    pub locked_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub version: u64,
}
