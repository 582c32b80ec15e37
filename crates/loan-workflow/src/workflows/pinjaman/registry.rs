//! Status registry: the legal transition graph of the pipeline. Pure lookups only.

use super::domain::ApplicationStatus::{Analyzing, ReadyForDecision, Returned, Submitted, UnderReview};
use super::domain::{Action, ApplicationStatus, Decision, Role};
use super::error::{ValidationError, WorkflowError};

/// Where a legal action leaves the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Claim or release only; status is unchanged.
    Unchanged,
    Status(ApplicationStatus),
    /// Approved or Rejected depending on the decision value.
    ByDecision,
}

/// One row of the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule {
    pub from: ApplicationStatus,
    pub action: Action,
    pub target: Target,
    /// Role allowed to trigger the row. `None` means any caller that holds the lock.
    pub role: Option<Role>,
}

impl TransitionRule {
    /// Resolve the status the application lands in.
    pub fn resolve(&self, decision: Option<Decision>) -> Result<ApplicationStatus, ValidationError> {
        match self.target {
            Target::Unchanged => Ok(self.from),
            Target::Status(status) => Ok(status),
            Target::ByDecision => match decision {
                Some(Decision::Approve) => Ok(ApplicationStatus::Approved),
                Some(Decision::Reject) => Ok(ApplicationStatus::Rejected),
                None => Err(ValidationError::MissingDecision),
            },
        }
    }
}

const fn rule(
    from: ApplicationStatus,
    action: Action,
    target: Target,
    role: Option<Role>,
) -> TransitionRule {
    TransitionRule {
        from,
        action,
        target,
        role,
    }
}

pub static TRANSITIONS: [TransitionRule; 14] = [
    rule(Submitted, Action::Take, Target::Status(UnderReview), Some(Role::CreditAdmin)),
    rule(UnderReview, Action::Take, Target::Unchanged, Some(Role::CreditAdmin)),
    rule(Analyzing, Action::Take, Target::Unchanged, Some(Role::Analyst)),
    rule(ReadyForDecision, Action::Take, Target::Unchanged, Some(Role::DecisionMaker)),
    rule(UnderReview, Action::Release, Target::Unchanged, None),
    rule(Analyzing, Action::Release, Target::Unchanged, None),
    rule(ReadyForDecision, Action::Release, Target::Unchanged, None),
    rule(UnderReview, Action::Advance, Target::Status(Analyzing), Some(Role::CreditAdmin)),
    rule(UnderReview, Action::Return, Target::Status(Returned), Some(Role::CreditAdmin)),
    rule(Analyzing, Action::Advance, Target::Status(ReadyForDecision), Some(Role::Analyst)),
    rule(Analyzing, Action::Return, Target::Status(Returned), Some(Role::Analyst)),
    rule(ReadyForDecision, Action::Decide, Target::ByDecision, Some(Role::DecisionMaker)),
    rule(ReadyForDecision, Action::Return, Target::Status(Returned), Some(Role::DecisionMaker)),
    rule(Returned, Action::Resubmit, Target::Status(Submitted), Some(Role::Intake)),
];

/// Look up the row for `(status, action)`.
///
/// Terminal statuses reject everything with [`WorkflowError::Terminal`]; any
/// pair missing from the table is [`WorkflowError::InvalidTransition`].
pub fn lookup(status: ApplicationStatus, action: Action) -> Result<TransitionRule, WorkflowError> {
    if status.is_terminal() {
        return Err(WorkflowError::Terminal(status));
    }

    TRANSITIONS
        .iter()
        .find(|candidate| candidate.from == status && candidate.action == action)
        .copied()
        .ok_or(WorkflowError::InvalidTransition { status, action })
}

/// Actions the table allows from `status`, ignoring role and lock state.
///
/// Used by the `demo` walkthrough to show what a status accepts next.
pub fn legal_actions(status: ApplicationStatus) -> Vec<Action> {
    TRANSITIONS
        .iter()
        .filter(|candidate| candidate.from == status)
        .map(|candidate| candidate.action)
        .fold(Vec::new(), |mut actions, action| {
            if !actions.contains(&action) {
                actions.push(action);
            }
            actions
        })
}

/// Statuses reachable from `status` through a status-changing row.
pub fn successors(status: ApplicationStatus) -> Vec<ApplicationStatus> {
    let mut next = Vec::new();
    for candidate in TRANSITIONS.iter().filter(|candidate| candidate.from == status) {
        let reachable: &[ApplicationStatus] = match candidate.target {
            Target::Unchanged => &[],
            Target::Status(ref target) => std::slice::from_ref(target),
            Target::ByDecision => &[ApplicationStatus::Approved, ApplicationStatus::Rejected],
        };
        for target in reachable {
            if !next.contains(target) {
                next.push(*target);
            }
        }
    }
    next
}
