//! Role, ownership, and lock rules deciding which actions a caller may perform.
//!
//! The mutation path and the read-only permission query both go through
//! [`AuthorizationRules::authorize`], so a displayed permission always matches
//! what `execute` will accept (notes and decision values aside).

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{Action, Actor, ApplicationStatus, LoanApplication};
use super::error::{ForbiddenReason, ValidationError, WorkflowError};
use super::lock::LockPolicy;
use super::registry::{self, TransitionRule};

/// Who may send a returned application back to `Submitted`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResubmissionPolicy {
    /// Only the intake clerk who created the application.
    #[default]
    IntakeOwnerOnly,
    /// Any user with the intake role.
    AnyIntake,
}

impl ResubmissionPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "intake_owner" | "owner" => Some(Self::IntakeOwnerOnly),
            "any_intake" | "any" => Some(Self::AnyIntake),
            _ => None,
        }
    }
}

/// What the caller may do right now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PermissionSet {
    pub take: bool,
    pub release: bool,
    pub advance: bool,
    #[serde(rename = "return")]
    pub return_: bool,
    pub decide: bool,
    pub resubmit: bool,
}

impl PermissionSet {
    pub fn allows(&self, action: Action) -> bool {
        match action {
            Action::Take => self.take,
            Action::Release => self.release,
            Action::Advance => self.advance,
            Action::Return => self.return_,
            Action::Decide => self.decide,
            Action::Resubmit => self.resubmit,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthorizationRules {
    lock: LockPolicy,
    resubmission: ResubmissionPolicy,
    min_note_chars: usize,
}

impl AuthorizationRules {
    pub fn new(lock: LockPolicy, resubmission: ResubmissionPolicy, min_note_chars: usize) -> Self {
        Self {
            lock,
            resubmission,
            min_note_chars,
        }
    }

    /// Decide whether `actor` may perform `action` on `application`.
    ///
    /// Terminal status and table legality are checked first. After that, take
    /// checks role, sticky owner, then the lock; lock-bound actions check the
    /// lock before the role; resubmit checks role and then the resubmission
    /// policy.
    pub fn authorize(
        &self,
        application: &LoanApplication,
        actor: &Actor,
        action: Action,
        now: DateTime<Utc>,
    ) -> Result<TransitionRule, WorkflowError> {
        let rule = registry::lookup(application.status, action)?;

        match action {
            Action::Take => self.authorize_take(application, actor, &rule, now)?,
            Action::Release => {
                self.require_holder(application, actor, now)?;
            }
            Action::Advance | Action::Return | Action::Decide => {
                self.lock.require_held(application, &actor.user_id, now)?;
                require_role(&rule, actor)?;
            }
            Action::Resubmit => self.authorize_resubmit(application, actor, &rule)?,
        }

        Ok(rule)
    }

    fn authorize_take(
        &self,
        application: &LoanApplication,
        actor: &Actor,
        rule: &TransitionRule,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        require_role(rule, actor)?;

        // A fresh submission is open to any credit-admin; later stages honour
        // the sticky owner of record before looking at the lock.
        if application.status != ApplicationStatus::Submitted {
            if let Some(stage) = application.status.stage() {
                if let Some(owner) = application.owners.owner(stage) {
                    if owner != &actor.user_id {
                        return Err(WorkflowError::Forbidden {
                            operation: Action::Take.label(),
                            role: actor.role,
                            reason: ForbiddenReason::OwnedByOther(owner.clone()),
                        });
                    }
                }
            }
        }

        match self.lock.live_holder(application, now) {
            Some(holder) => Err(WorkflowError::Conflict {
                holder: holder.clone(),
            }),
            None => Ok(()),
        }
    }

    fn require_holder(
        &self,
        application: &LoanApplication,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        match self.lock.live_holder(application, now) {
            Some(holder) if holder == &actor.user_id => Ok(()),
            holder => Err(WorkflowError::NotLockHolder {
                holder: holder.cloned(),
            }),
        }
    }

    fn authorize_resubmit(
        &self,
        application: &LoanApplication,
        actor: &Actor,
        rule: &TransitionRule,
    ) -> Result<(), WorkflowError> {
        require_role(rule, actor)?;
        match self.resubmission {
            ResubmissionPolicy::AnyIntake => Ok(()),
            ResubmissionPolicy::IntakeOwnerOnly if application.intake_owner == actor.user_id => {
                Ok(())
            }
            ResubmissionPolicy::IntakeOwnerOnly => Err(WorkflowError::Forbidden {
                operation: Action::Resubmit.label(),
                role: actor.role,
                reason: ForbiddenReason::NotIntakeOwner(application.intake_owner.clone()),
            }),
        }
    }

    /// Normalise and check the note attached to an action.
    pub fn validate_note(
        &self,
        action: Action,
        note: Option<&str>,
    ) -> Result<Option<String>, ValidationError> {
        let trimmed = note.map(str::trim).filter(|note| !note.is_empty());
        if !action.requires_note() {
            return Ok(trimmed.map(str::to_string));
        }

        let note = trimmed.ok_or(ValidationError::EmptyNote)?;
        let actual = note.chars().count();
        if actual < self.min_note_chars {
            return Err(ValidationError::NoteTooShort {
                min: self.min_note_chars,
                actual,
            });
        }
        Ok(Some(note.to_string()))
    }

    pub fn can(
        &self,
        application: &LoanApplication,
        actor: &Actor,
        action: Action,
        now: DateTime<Utc>,
    ) -> bool {
        self.authorize(application, actor, action, now).is_ok()
    }

    pub fn can_take(&self, application: &LoanApplication, actor: &Actor, now: DateTime<Utc>) -> bool {
        self.can(application, actor, Action::Take, now)
    }

    pub fn can_release(
        &self,
        application: &LoanApplication,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> bool {
        self.can(application, actor, Action::Release, now)
    }

    pub fn can_advance(
        &self,
        application: &LoanApplication,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> bool {
        self.can(application, actor, Action::Advance, now)
    }

    pub fn can_return(
        &self,
        application: &LoanApplication,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> bool {
        self.can(application, actor, Action::Return, now)
    }

    pub fn can_decide(
        &self,
        application: &LoanApplication,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> bool {
        self.can(application, actor, Action::Decide, now)
    }

    pub fn permissions(
        &self,
        application: &LoanApplication,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> PermissionSet {
        PermissionSet {
            take: self.can_take(application, actor, now),
            release: self.can_release(application, actor, now),
            advance: self.can_advance(application, actor, now),
            return_: self.can_return(application, actor, now),
            decide: self.can_decide(application, actor, now),
            resubmit: self.can(application, actor, Action::Resubmit, now),
        }
    }
}

fn require_role(rule: &TransitionRule, actor: &Actor) -> Result<(), WorkflowError> {
    match rule.role {
        Some(role) if role != actor.role => Err(WorkflowError::Forbidden {
            operation: rule.action.label(),
            role: actor.role,
            reason: ForbiddenReason::WrongRole(role),
        }),
        _ => Ok(()),
    }
}

