use super::domain::{Action, ApplicationId, ApplicationStatus, Role, UserId};
use super::repository::RepositoryError;

/// Typed rejection returned by every engine operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error("application {0} not found")]
    NotFound(ApplicationId),
    #[error("{role} may not {operation}: {reason}")]
    Forbidden {
        operation: &'static str,
        role: Role,
        reason: ForbiddenReason,
    },
    #[error("cannot {action} an application in status {status}")]
    InvalidTransition {
        status: ApplicationStatus,
        action: Action,
    },
    #[error("application is {0} and accepts no further actions")]
    Terminal(ApplicationStatus),
    #[error("application already claimed by {holder}")]
    Conflict { holder: UserId },
    #[error("lock is not held by the caller")]
    NotLockHolder { holder: Option<UserId> },
    #[error("application is not claimed by anyone")]
    NotLocked,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl WorkflowError {
    /// Short machine-readable kind used in API payloads and logs.
    pub const fn kind(&self) -> &'static str {
        match self {
            WorkflowError::NotFound(_) => "not_found",
            WorkflowError::Forbidden { .. } => "forbidden",
            WorkflowError::InvalidTransition { .. } => "invalid_transition",
            WorkflowError::Terminal(_) => "terminal",
            WorkflowError::Conflict { .. } => "conflict",
            WorkflowError::NotLockHolder { .. } => "not_lock_holder",
            WorkflowError::NotLocked => "not_locked",
            WorkflowError::Validation(_) => "validation_error",
            WorkflowError::Repository(_) => "repository_error",
        }
    }

    /// Attach the application id to a store-level miss.
    pub(crate) fn for_application(self, id: &ApplicationId) -> Self {
        match self {
            WorkflowError::Repository(RepositoryError::NotFound) => {
                WorkflowError::NotFound(id.clone())
            }
            other => other,
        }
    }
}

/// Why a role or ownership check refused the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ForbiddenReason {
    #[error("action belongs to the {0} role")]
    WrongRole(Role),
    #[error("stage is assigned to {0}")]
    OwnedByOther(UserId),
    #[error("only the intake owner {0} may resubmit")]
    NotIntakeOwner(UserId),
}

/// Input validation failures for notes, decisions, and intake data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("a note is required")]
    EmptyNote,
    #[error("note must be at least {min} characters (got {actual})")]
    NoteTooShort { min: usize, actual: usize },
    #[error("decide requires an approve or reject selection")]
    MissingDecision,
    #[error("borrower name must not be empty")]
    EmptyBorrowerName,
    #[error("requested amount must be positive")]
    InvalidAmount,
    #[error("tenor must be at least one month")]
    InvalidTenor,
}
